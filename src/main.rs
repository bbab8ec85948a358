fn main() -> std::process::ExitCode {
    server_installer_lib::run()
}
