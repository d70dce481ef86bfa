use anyhow::Result;
use env_logger::{Builder, Env};
use log::error;

mod cli;
mod util;
mod cmd_list;
mod cmd_show;
mod cmd_gc;
mod cmd_migrate;
mod cmd_export;
mod cmd_keygen;
mod cmd_defaults;

fn init_logger() {
    // Уровень берём из RUST_LOG, иначе дефолт info.
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();

    if let Err(e) = run() {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    match cli.cmd {
        cli::Cmd::List { dir, json } =>
            cmd_list::exec(dir, json),

        cli::Cmd::Show { dir, id, json } =>
            cmd_show::exec(dir, id, json),

        cli::Cmd::Gc { dir, keep } =>
            cmd_gc::exec(dir, keep),

        cli::Cmd::Migrate { dir } =>
            cmd_migrate::exec(dir),

        cli::Cmd::Export { dir, id, out } =>
            cmd_export::exec(dir, id, out),

        cli::Cmd::Keygen { base64 } =>
            cmd_keygen::exec(base64),

        cli::Cmd::Defaults { metatype, json } =>
            cmd_defaults::exec(metatype, json),
    }
}
