fn main() {
    // The Tauri context (tauri.conf.json, icons, frontend dist) is only
    // needed when the window shell is compiled in.
    #[cfg(feature = "desktop")]
    tauri_build::build();
}
