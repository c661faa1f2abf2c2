fn main() -> std::process::ExitCode {
    manga_edge_lib::run()
}
