use std::io::{self, stdout};

use clap::{Arg, Command};
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use dialoguer::{theme::ColorfulTheme, Select};
use hive_ops::aws::{ec2, spec};

pub const NAME: &str = "delete";

pub fn command() -> Command {
    Command::new(NAME)
        .about("Terminates every instance of the deployment group")
        .arg(
            Arg::new("LOG_LEVEL")
                .long("log-level")
                .short('l')
                .help("Sets the log level")
                .required(false)
                .num_args(1)
                .value_parser(["debug", "info"])
                .default_value("info"),
        )
        .arg(
            Arg::new("SPEC_FILE_PATH")
                .long("spec-file-path")
                .short('s')
                .help("The spec file to load")
                .required(true)
                .num_args(1),
        )
        .arg(
            Arg::new("SKIP_PROMPT")
                .long("skip-prompt")
                .help("Skips prompt mode")
                .required(false)
                .num_args(0),
        )
}

pub async fn execute(log_level: &str, spec_file_path: &str, skip_prompt: bool) -> io::Result<()> {
    // ref. https://github.com/env-logger-rs/env_logger/issues/47
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, log_level),
    );

    let spec = spec::Spec::load(spec_file_path)?;
    spec.validate()?;
    let region = spec.region()?;

    let shared_config = aws_manager::load_config(Some(region), None, None).await;
    let ec2_manager = ec2::Manager::new(&shared_config);

    let instances = ec2_manager.describe_by_group(&spec.id).await?;
    if instances.is_empty() {
        log::info!("no instances found in group '{}'", spec.id);
        return Ok(());
    }

    println!("Instances in group '{}':", spec.id);
    for snapshot in instances.iter() {
        println!("  {} ({})", snapshot.instance_id, snapshot.state_name);
    }

    if !skip_prompt {
        let options = &[
            "No, I am not ready to terminate the fleet.",
            "Yes, let's terminate the fleet.",
        ];
        let selected = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("Select your 'delete' option")
            .items(&options[..])
            .default(0)
            .interact()
            .unwrap();
        if selected == 0 {
            return Ok(());
        }
    }

    let instance_ids: Vec<String> = instances
        .iter()
        .map(|s| s.instance_id.clone())
        .collect();
    for instance_id in instance_ids.iter() {
        log::info!("terminating {}", instance_id);
    }
    ec2_manager.terminate_instances(instance_ids).await?;

    execute!(
        stdout(),
        SetForegroundColor(Color::Green),
        Print("\n\n\nSUCCESS: fleet terminated\n"),
        ResetColor
    )?;

    Ok(())
}
