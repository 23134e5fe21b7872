fn main() {
    // Forwards the ESP-IDF build environment when cross-compiling for the
    // device; emits nothing on plain host builds.
    embuild::espidf::sysenv::output();
}
