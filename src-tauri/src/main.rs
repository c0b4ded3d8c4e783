// Prevents additional console window on Windows in release, DO NOT REMOVE!!
#![cfg_attr(
    all(not(debug_assertions), feature = "desktop"),
    windows_subsystem = "windows"
)]

fn main() {
    #[cfg(feature = "desktop")]
    {
        vms_desktop_lib::run()
    }

    #[cfg(not(feature = "desktop"))]
    {
        match vms_desktop_lib::run_headless() {
            Ok(code) => std::process::exit(code),
            Err(e) => {
                eprintln!("vms-desktop: {:#}", e);
                std::process::exit(1);
            }
        }
    }
}
