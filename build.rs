fn main() {
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os == "windows" {
        let mut res = winresource::WindowsResource::new();
        res.set("ProductName", "WebWall");
        res.set("FileDescription", "Interactive web desktop wallpaper host");
        if let Err(e) = res.compile() {
            println!("cargo:warning=failed to embed version resource: {e}");
        }
    }
}
