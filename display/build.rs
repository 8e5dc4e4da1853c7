fn main() {
    // Propagates ESP-IDF toolchain settings when building for the device;
    // a no-op on host builds.
    embuild::espidf::sysenv::output();
}
