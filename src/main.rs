use std::env;
use std::process::ExitCode;
use std::time::Duration;

use tracing::{error, info};

use railmon::error::{Error, Result};
use railmon::{Acquisition, AcquisitionCtx, RunOutcome, SimDriver, TextDispatcher, logging};

struct CliArgs {
    base_name: String,
    duration: Duration,
}

/// Parse the two required positional arguments: output file base name and
/// run duration in whole seconds. No flags, no environment, no config file.
fn parse_args(args: &[String]) -> Result<CliArgs> {
    if args.len() < 2 {
        return Err(Error::Argument(
            "expected <output base name> <run duration, whole seconds>".into(),
        ));
    }
    let duration_secs: u64 = args[1].parse().map_err(|_| {
        Error::Argument(format!(
            "run duration `{}` is not a whole number of seconds",
            args[1]
        ))
    })?;
    if duration_secs == 0 {
        return Err(Error::Argument("run duration must be nonzero".into()));
    }

    Ok(CliArgs {
        base_name: args[0].clone(),
        duration: Duration::from_secs(duration_secs),
    })
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(1);
        }
    };

    let mut ctx = AcquisitionCtx::default();
    ctx.op_name = cli.base_name;
    ctx.run_duration = cli.duration;

    if let Err(e) = logging::init_logging(&ctx.op_dir, &ctx.op_name) {
        eprintln!("{e}");
        return ExitCode::from(1);
    }

    let mut acquisition = Acquisition::new(ctx);
    acquisition.add_dispatcher(Box::new(TextDispatcher::new()));

    let mut driver = SimDriver::new();
    let code = match acquisition.run(&mut driver) {
        // Being cut off by the wall-clock limit is reported nonzero;
        // a handled acquisition fault falls through clean
        Ok(RunOutcome::TimeLimit) => 1,
        Ok(RunOutcome::DriverStopped) => 0,
        Err(Error::Driver(_)) => 0,
        Err(e) => {
            error!("{e}");
            1
        }
    };

    info!("End of program");
    ExitCode::from(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn accepts_base_name_and_seconds() {
        let cli = parse_args(&args(&["power_data", "6"])).unwrap();
        assert_eq!(cli.base_name, "power_data");
        assert_eq!(cli.duration, Duration::from_secs(6));
    }

    #[test]
    fn rejects_missing_arguments() {
        assert!(matches!(parse_args(&args(&[])), Err(Error::Argument(_))));
        assert!(matches!(
            parse_args(&args(&["power_data"])),
            Err(Error::Argument(_))
        ));
    }

    #[test]
    fn rejects_non_numeric_duration() {
        assert!(matches!(
            parse_args(&args(&["power_data", "six"])),
            Err(Error::Argument(_))
        ));
        assert!(matches!(
            parse_args(&args(&["power_data", "6.5"])),
            Err(Error::Argument(_))
        ));
    }

    #[test]
    fn rejects_zero_duration() {
        assert!(matches!(
            parse_args(&args(&["power_data", "0"])),
            Err(Error::Argument(_))
        ));
    }
}
