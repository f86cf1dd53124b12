use env_logger;
use std::io::Write;

/// Logs to stdout at `level`. `RUST_LOG`, when set, refines per-module levels on top.
///
/// Lines carry the thread name so polling-thread output can be told apart
/// from request handling.
pub fn setup_logging(level: log::LevelFilter) {
    let result = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{0} {1} {2} {3}] {4}",
                record.level(),
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                std::thread::current().name().unwrap_or("-"),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .target(env_logger::Target::Stdout)
        .try_init();

    if let Err(err) = result {
        eprintln!("Logger already initialised: {err}");
    }
}
