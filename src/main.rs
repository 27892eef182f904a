//! Binary entry point: run the router, print one terminal line on failure,
//! and map the failure class onto the documented exit codes.

fn main() {
    match junction::run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            junction::core::output::failure_line(&err);
            std::process::exit(err.exit_code());
        }
    }
}
