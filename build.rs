use std::{env, fs};
use std::path::PathBuf;

fn out_dir() -> String {
    env::var("OUT_DIR").expect("No OUT_DIR env var")
}

// macOS refuses bluetooth access to binaries without a usage description
fn build_info_plist() {
    let out_path: PathBuf = [out_dir().as_str(), "Info.plist"].iter().collect();
    let version = env::var("CARGO_PKG_VERSION").expect("No CARGO_PKG_VERSION env var");

    let plist = format!(r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>CFBundleIdentifier</key>
    <string>de.ampel.remote</string>
    <key>CFBundleName</key>
    <string>AmpelRemote</string>
    <key>CFBundleShortVersionString</key>
    <string>{version}</string>
    <key>NSBluetoothAlwaysUsageDescription</key>
    <string>Ampel Remote uses Bluetooth to control the traffic light.</string>
</dict>
</plist>
"#);

    fs::write(&out_path, plist).expect("Failed to write Info.plist");
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    build_info_plist();
}
