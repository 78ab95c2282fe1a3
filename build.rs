fn main() {
    // Only run ESP-IDF build system when targeting ESP-IDF (Xtensa or RISC-V,
    // e.g. riscv32imac-esp-espidf for the Wi-Fi 6 capable ESP32-C6).
    // Build scripts run on the host, so we check the TARGET env var
    if let Ok(target) = std::env::var("TARGET") {
        if target.ends_with("-espidf") {
            embuild::espidf::sysenv::output();
        }
    }
}
