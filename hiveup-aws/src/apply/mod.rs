use std::{
    env,
    io::{self, stdout, Error, ErrorKind},
    path::Path,
};

use clap::{Arg, Command};
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use dialoguer::{theme::ColorfulTheme, Select};
use hive_ops::{
    artifacts,
    aws::{ec2, ingress, spec},
    manifests,
    poller::{PassOutcome, ReadinessPoller},
};
use tokio::time::{sleep, Duration};

use crate::scp;

pub const NAME: &str = "apply";

pub fn command() -> Command {
    Command::new(NAME)
        .about("Provisions the fleet, generates manifests and deploys them")
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

/// Interval between readiness classification passes. Bounds the API
/// call rate, not responsiveness.
const POLL_INTERVAL_SECONDS: u64 = 30;

/// Remote drop directory for generated puppet manifests.
const PUPPET_DROP_DIR: &str = "/var/www/html/chroot/puppetdrop/drop";
/// Remote directory for the distribution archive when not using S3.
const PUPPET_FILES_DIR: &str = "/puppetdrop/files";

/// AWS credentials pulled from the process environment at startup.
struct Credentials {
    account_id: String,
}

/// Fails immediately when any of the three required credential
/// variables is unset. The SDK credential chain reads the key pair
/// itself; the account id feeds the named security-group grant.
fn load_credentials() -> io::Result<Credentials> {
    for name in ["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY"] {
        if env::var(name).is_err() {
            return Err(Error::new(
                ErrorKind::NotFound,
                format!("{} not set", name),
            ));
        }
        log::info!("{} found", name);
    }
    let account_id = env::var("AWS_ACCOUNT_ID").map_err(|_| {
        Error::new(ErrorKind::NotFound, "AWS_ACCOUNT_ID not set")
    })?;
    log::info!("AWS_ACCOUNT_ID found");
    Ok(Credentials { account_id })
}

pub async fn execute(log_level: &str, spec_file_path: &str, skip_prompt: bool) -> io::Result<()> {
    // ref. https://github.com/env-logger-rs/env_logger/issues/47
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, log_level),
    );

    let credentials = load_credentials()?;

    let spec = spec::Spec::load(spec_file_path)?;
    spec.validate()?;
    let region = spec.region()?;

    let dist_filename =
        artifacts::find_distribution(&spec.distribution.dir, &spec.distribution.prefix)?;
    let dist_path = format!("{}/{}", spec.distribution.dir, dist_filename);
    log::info!("found distribution '{}'", dist_path);

    let spec_contents = spec.encode_yaml()?;
    println!("{}\n", spec_contents);

    if !skip_prompt {
        let options = &[
            "No, I am not ready to provision the fleet.",
            "Yes, let's provision the fleet.",
        ];
        let selected = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("Select your 'apply' option")
            .items(&options[..])
            .default(0)
            .interact()
            .unwrap();
        if selected == 0 {
            return Ok(());
        }
    }

    let shared_config = aws_manager::load_config(Some(region.clone()), None, None).await;
    let ec2_manager = ec2::Manager::new(&shared_config);

    execute!(
        stdout(),
        SetForegroundColor(Color::Green),
        Print("\n\n\nSTEP: ensure security group\n"),
        ResetColor
    )?;
    let existing = ec2_manager.list_security_group_names().await?;
    if let Some(plan) = ingress::plan_ingress(&existing, &spec.id, &credentials.account_id) {
        ec2_manager.apply_ingress_plan(&plan).await?;
    }

    execute!(
        stdout(),
        SetForegroundColor(Color::Green),
        Print("\n\n\nSTEP: discover instances\n"),
        ResetColor
    )?;
    let launched = if spec.start_instances {
        log::info!("starting EC2 instances");
        ec2_manager
            .run_instances(
                &spec.machine.image_id,
                spec.machine.instance_count,
                &spec.id,
                &spec.resource.ec2_key_name,
                &spec.machine.instance_type,
                spec.resource.availability_zone.as_deref(),
            )
            .await?
    } else {
        log::info!("describing running EC2 instances");
        ec2_manager.describe_by_group(&spec.id).await?
    };

    let candidates: Vec<String> = launched
        .iter()
        .filter(|s| s.group == spec.id)
        .map(|s| s.instance_id.clone())
        .collect();
    if candidates.is_empty() {
        return Err(Error::new(
            ErrorKind::NotFound,
            format!("no instances found in group '{}'", spec.id),
        ));
    }

    execute!(
        stdout(),
        SetForegroundColor(Color::Green),
        Print("\n\n\nSTEP: wait for instance readiness\n"),
        ResetColor
    )?;
    let mut poller = ReadinessPoller::new(&spec.id, spec.machine.instance_count as usize);
    loop {
        sleep(Duration::from_secs(POLL_INTERVAL_SECONDS)).await;

        // one query per candidate per pass
        let mut pass = Vec::new();
        for instance_id in candidates.iter() {
            pass.push(ec2_manager.describe_instance(instance_id).await?);
        }

        match poller.observe_pass(pass) {
            PassOutcome::Satisfied => break,
            PassOutcome::KeepWaiting { running, pending } => {
                println!(
                    "Started {} instances, {} still pending. Waiting...",
                    running, pending
                );
            }
            PassOutcome::PromptOperator { running, pending } => {
                if skip_prompt {
                    poller.operator_decision(true);
                    break;
                }
                println!("Started {} instances, {} still pending.", running, pending);
                let accept_option =
                    format!("Yes, proceed with just the {} running instances.", running);
                let options = &[
                    "No, keep waiting for the full fleet.",
                    accept_option.as_str(),
                    "Abort the wait.",
                ];
                let selected = Select::with_theme(&ColorfulTheme::default())
                    .with_prompt("Proceed with a partial fleet?")
                    .items(&options[..])
                    .default(0)
                    .interact()
                    .unwrap();
                match selected {
                    0 => poller.operator_decision(false),
                    1 => {
                        poller.operator_decision(true);
                        break;
                    }
                    _ => {
                        poller.give_up();
                        return Err(Error::new(
                            ErrorKind::Interrupted,
                            "operator aborted the readiness wait",
                        ));
                    }
                }
            }
        }
    }
    println!("Started {} instances.", poller.running().len());

    // manifest generation runs only over confirmed-running instances
    let pairs: Vec<manifests::AddressPair> = poller
        .running()
        .iter()
        .map(|s| manifests::AddressPair::new(&s.public_dns, &s.private_dns))
        .collect();

    execute!(
        stdout(),
        SetForegroundColor(Color::Green),
        Print("\n\n\nSTEP: generate manifests\n"),
        ResetColor
    )?;
    let node_list_path = format!("{}.new", spec.id);
    let puppet_manifest_path = format!("{}.pp", spec.id);

    manifests::write_manifest(&node_list_path, &manifests::render_node_list(&pairs))?;
    manifests::write_manifest(
        &puppet_manifest_path,
        &manifests::render_puppet_manifest(
            &pairs,
            &spec.id,
            &spec.puppet.repo_url,
            &dist_filename,
            spec.distribution.upload_to_s3,
        ),
    )?;
    manifests::write_manifest(&spec.output.seed_file, &manifests::render_seed_file(&pairs))?;
    manifests::write_manifest(
        &spec.output.proxy_file,
        &manifests::render_proxy_file(&pairs),
    )?;
    manifests::write_manifest(
        &spec.output.address_file,
        &manifests::render_address_file(&pairs),
    )?;
    manifests::write_manifest(
        &spec.output.demo_nodes_file,
        &manifests::render_demo_nodes_file(&pairs),
    )?;
    manifests::write_manifest(
        &spec.output.monitoring_file,
        &manifests::render_monitoring_file(&pairs),
    )?;
    manifests::write_manifest(&spec.output.cssh_file, &manifests::render_cssh_file(&pairs))?;

    // split the bootstrap sequence into two independently seedable
    // halves plus one bridging entry
    let mid = manifests::midpoint(&pairs);
    if mid >= 1 {
        manifests::write_manifest(
            "SeedFirstHalf",
            &manifests::render_seed_file(&pairs[..mid]),
        )?;
        manifests::write_manifest(
            "SeedSecondHalf",
            &manifests::render_seed_file(&pairs[mid..]),
        )?;
        manifests::write_manifest(
            "SeedJoin",
            &manifests::render_seed_file(&pairs[mid - 1..=mid]),
        )?;
        manifests::write_manifest(
            "cssh_first_half.sh",
            &manifests::render_cssh_file(&pairs[..mid]),
        )?;
        manifests::write_manifest(
            "cssh_second_half.sh",
            &manifests::render_cssh_file(&pairs[mid..]),
        )?;
    } else {
        log::info!("fleet too small to split seed files, skipping halves");
    }

    if spec.deploy {
        execute!(
            stdout(),
            SetForegroundColor(Color::Green),
            Print("\n\n\nSTEP: deploy manifests\n"),
            ResetColor
        )?;

        let mut uploads: Vec<(String, String)> = Vec::new();
        for file in [&node_list_path, &puppet_manifest_path] {
            let base = Path::new(file)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(file.as_str());
            uploads.push((file.clone(), format!("{}/{}", PUPPET_DROP_DIR, base)));
        }
        if !spec.distribution.upload_to_s3 {
            uploads.push((
                dist_path.clone(),
                format!("{}/{}", PUPPET_FILES_DIR, dist_filename),
            ));
        }
        scp::upload_files(
            &spec.puppet.puppetmaster_host,
            &spec.puppet.drop_user,
            &spec.puppet.drop_password,
            &uploads,
        )?;

        if spec.distribution.upload_to_s3 {
            let s3_manager = aws_manager::s3::Manager::new(&shared_config);
            log::info!(
                "uploading '{}' as '{}' to bucket '{}'",
                dist_path,
                dist_filename,
                spec.distribution.s3_bucket
            );
            s3_manager
                .create_bucket(&spec.distribution.s3_bucket)
                .await
                .map_err(|e| {
                    Error::new(ErrorKind::Other, format!("failed create_bucket {:?}", e))
                })?;
            s3_manager
                .put_object(&dist_path, &spec.distribution.s3_bucket, &dist_filename)
                .await
                .map_err(|e| {
                    Error::new(ErrorKind::Other, format!("failed put_object {:?}", e))
                })?;
        }
    }

    execute!(
        stdout(),
        SetForegroundColor(Color::Green),
        Print("\n\n\nSUCCESS: fleet ready\n"),
        ResetColor
    )?;
    println!("Created puppet files:");
    println!("{}", node_list_path);
    println!("{}", puppet_manifest_path);
    println!("{}", spec.output.seed_file);
    println!("{}", spec.output.proxy_file);
    println!("{}", spec.output.address_file);
    println!("{}", spec.output.demo_nodes_file);
    println!("{}", spec.output.monitoring_file);
    println!("{}", spec.output.cssh_file);

    Ok(())
}
