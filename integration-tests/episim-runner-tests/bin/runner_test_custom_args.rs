use clap::Args;
use episim::runner::run_with_custom_args;
use episim::EpisimError;

#[derive(Args, Debug)]
struct CustomArgs {
    /// Multiplies the configured calibration parameter
    #[arg(long, default_value = "1.0")]
    calibration_scale: f64,

    /// Closes this activity for the whole run
    #[arg(long)]
    close: Option<String>,
}

fn main() {
    let outcomes = run_with_custom_args(|config, _, custom_args: Option<&CustomArgs>| {
        let Some(custom_args) = custom_args else {
            return Ok(());
        };
        if custom_args.calibration_scale < 0.0 {
            return Err(EpisimError::config("calibration scale must be >= 0"));
        }
        config.calibration_parameter *= custom_args.calibration_scale;
        if let Some(activity) = &custom_args.close {
            let closed = episim::restriction::RestrictionUpdate::fraction(0.0);
            config
                .policy
                .entry(activity.clone())
                .or_default()
                .insert(config.start_date, closed);
        }
        println!("calibration {}", config.calibration_parameter);
        Ok(())
    });
    match outcomes {
        Ok(outcomes) => {
            for outcome in outcomes {
                println!("seed {} days {}", outcome.seed, outcome.days_completed);
            }
        }
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
