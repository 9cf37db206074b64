/// CLI for the Lost & Found API
fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    lostfound_core::cli_app::run(args)
}
