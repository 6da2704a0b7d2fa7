use crate::monitors::MonitorInfo;

/// Identity of one active instance for planning purposes: its current
/// monitor index plus the stable device name it was created on.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveInstance {
    pub monitor_index: usize,
    pub device_name: String,
}

/// One surviving instance and the (possibly renumbered, possibly moved)
/// monitor snapshot it must be rebound to.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceMove {
    pub old_monitor_index: usize,
    pub monitor: MonitorInfo,
}

/// Outcome of diffing an old monitor set against a fresh enumeration.
/// Removals are processed first, then resizes, then additions — tearing down
/// before moving avoids transient overlap on the surviving layers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    /// monitor_index values (old numbering) whose instance must be torn down.
    pub removals: Vec<usize>,
    /// Surviving instances with their new monitor snapshots.
    pub resizes: Vec<InstanceMove>,
    /// Monitors with no previous counterpart, eligible for auto-start.
    pub additions: Vec<MonitorInfo>,
}

impl ReconcilePlan {
    pub fn is_noop(&self) -> bool {
        self.removals.is_empty() && self.resizes.is_empty() && self.additions.is_empty()
    }
}

/// Pure reconcile planning: match instances to the new monitor set by
/// device name. Monitors present in both sets always produce a resize entry
/// (resolution or position may have changed without a count change); the OS
/// apply step skips moves that turn out to be no-ops.
pub fn plan_reconcile(
    old_monitors: &[MonitorInfo],
    new_monitors: &[MonitorInfo],
    instances: &[ActiveInstance],
) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();

    for instance in instances {
        match new_monitors
            .iter()
            .find(|m| m.device_name == instance.device_name)
        {
            Some(monitor) => plan.resizes.push(InstanceMove {
                old_monitor_index: instance.monitor_index,
                monitor: monitor.clone(),
            }),
            None => plan.removals.push(instance.monitor_index),
        }
    }

    for monitor in new_monitors {
        let existed_before = old_monitors
            .iter()
            .any(|m| m.device_name == monitor.device_name);
        if !existed_before {
            plan.additions.push(monitor.clone());
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitors::test_monitor;

    fn active(monitor_index: usize, device: &str) -> ActiveInstance {
        ActiveInstance {
            monitor_index,
            device_name: device.to_string(),
        }
    }

    #[test]
    fn unplugging_one_of_two_monitors() {
        // Monitors "A" (primary, @0,0) and "B" (@1920,0), both hosting
        // wallpaper; "B" is unplugged.
        let old = vec![
            test_monitor(0, r"\\.\DISPLAY1", 0, 0, true),
            test_monitor(1, r"\\.\DISPLAY2", 1920, 0, false),
        ];
        let new = vec![test_monitor(0, r"\\.\DISPLAY1", 0, 0, true)];
        let instances = vec![
            active(0, r"\\.\DISPLAY1"),
            active(1, r"\\.\DISPLAY2"),
        ];

        let plan = plan_reconcile(&old, &new, &instances);

        assert_eq!(plan.removals, vec![1]);
        assert_eq!(plan.resizes.len(), 1);
        assert_eq!(plan.resizes[0].old_monitor_index, 0);
        assert_eq!(plan.resizes[0].monitor.device_name, r"\\.\DISPLAY1");
        assert!(plan.additions.is_empty());
    }

    #[test]
    fn equal_counts_still_resize_survivors() {
        let old = vec![test_monitor(0, r"\\.\DISPLAY1", 0, 0, true)];
        let mut moved = test_monitor(0, r"\\.\DISPLAY1", 0, 0, true);
        moved.width = 2560;
        moved.height = 1440;
        let new = vec![moved.clone()];

        let plan = plan_reconcile(&old, &new, &[active(0, r"\\.\DISPLAY1")]);
        assert!(plan.removals.is_empty());
        assert!(plan.additions.is_empty());
        assert_eq!(plan.resizes.len(), 1);
        assert_eq!(plan.resizes[0].monitor.width, 2560);
    }

    #[test]
    fn new_monitor_is_reported_as_addition() {
        let old = vec![test_monitor(0, r"\\.\DISPLAY1", 0, 0, true)];
        let new = vec![
            test_monitor(0, r"\\.\DISPLAY1", 0, 0, true),
            test_monitor(1, r"\\.\DISPLAY3", 1920, 0, false),
        ];

        let plan = plan_reconcile(&old, &new, &[active(0, r"\\.\DISPLAY1")]);
        assert!(plan.removals.is_empty());
        assert_eq!(plan.additions.len(), 1);
        assert_eq!(plan.additions[0].device_name, r"\\.\DISPLAY3");
    }

    #[test]
    fn renumbered_survivor_keeps_identity_via_device_name() {
        // "B" becomes index 0 after "A" disappears.
        let old = vec![
            test_monitor(0, r"\\.\DISPLAY1", 0, 0, true),
            test_monitor(1, r"\\.\DISPLAY2", 1920, 0, false),
        ];
        let new = vec![test_monitor(0, r"\\.\DISPLAY2", 0, 0, true)];
        let instances = vec![
            active(0, r"\\.\DISPLAY1"),
            active(1, r"\\.\DISPLAY2"),
        ];

        let plan = plan_reconcile(&old, &new, &instances);
        assert_eq!(plan.removals, vec![0]);
        assert_eq!(plan.resizes.len(), 1);
        assert_eq!(plan.resizes[0].old_monitor_index, 1);
        assert_eq!(plan.resizes[0].monitor.index, 0);
        assert!(plan.additions.is_empty());
    }

    #[test]
    fn instances_without_monitors_and_vice_versa() {
        let plan = plan_reconcile(&[], &[], &[]);
        assert!(plan.is_noop());

        // No instances: nothing to remove or resize, additions still listed.
        let new = vec![test_monitor(0, r"\\.\DISPLAY1", 0, 0, true)];
        let plan = plan_reconcile(&[], &new, &[]);
        assert!(plan.removals.is_empty());
        assert!(plan.resizes.is_empty());
        assert_eq!(plan.additions.len(), 1);
    }
}
