use std::process::ExitCode;

mod app;

fn main() -> ExitCode {
    app::init_tracing();
    let wiring = match app::build_app() {
        Ok(wiring) => wiring,
        Err(err) => {
            tracing::error!(error = %err, "startup_failed");
            return ExitCode::FAILURE;
        }
    };
    app::run(wiring)
}
