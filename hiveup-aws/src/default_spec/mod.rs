use std::io::{self, stdout};

use clap::{value_parser, Arg, Command};
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use hive_ops::aws::spec;

pub const NAME: &str = "default-spec";

pub fn command() -> Command {
    Command::new(NAME)
        .about("Writes a default deployment spec")
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
            Arg::new("ID")
                .long("id")
                .help("Deployment group name (no periods)")
                .required(true)
                .num_args(1),
        )
        .arg(
            Arg::new("ENDPOINT")
                .long("endpoint")
                .help("Region endpoint selector")
                .required(false)
                .num_args(1)
                .value_parser(["US", "EU"])
                .default_value("EU"),
        )
        .arg(
            Arg::new("AVAILABILITY_ZONE")
                .long("availability-zone")
                .help("Availability zone, e.g. eu-west-1a")
                .required(false)
                .num_args(1),
        )
        .arg(
            Arg::new("EC2_KEY_NAME")
                .long("ec2-key-name")
                .help("Key pair name for instance SSH access")
                .required(false)
                .num_args(1),
        )
        .arg(
            Arg::new("IMAGE_ID")
                .long("image-id")
                .help("Machine image to boot")
                .required(false)
                .num_args(1),
        )
        .arg(
            Arg::new("INSTANCE_COUNT")
                .long("instance-count")
                .help("Number of instances to launch")
                .required(true)
                .num_args(1)
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("INSTANCE_TYPE")
                .long("instance-type")
                .help("EC2 instance type, e.g. m5.large")
                .required(false)
                .num_args(1),
        )
        .arg(
            Arg::new("REPO_URL")
                .long("repo-url")
                .help("Puppet repository URL, e.g. hive.s3.amazonaws.com")
                .required(false)
                .num_args(1),
        )
        .arg(
            Arg::new("PUPPETMASTER_HOST")
                .long("puppetmaster-host")
                .help("Host that receives the generated manifests")
                .required(false)
                .num_args(1)
                .default_value(spec::DEFAULT_PUPPETMASTER),
        )
        .arg(
            Arg::new("DROP_USER")
                .long("drop-user")
                .help("Remote user for the manifest drop")
                .required(false)
                .num_args(1)
                .default_value(spec::DEFAULT_DROP_USER),
        )
        .arg(
            Arg::new("DROP_PASSWORD")
                .long("drop-password")
                .help("Password for the scp session")
                .required(false)
                .num_args(1),
        )
        .arg(
            Arg::new("DIST_DIR")
                .long("dist-dir")
                .help("Directory holding the distribution archive")
                .required(true)
                .num_args(1),
        )
        .arg(
            Arg::new("DIST_PREFIX")
                .long("dist-prefix")
                .help("Distribution archive filename prefix")
                .required(false)
                .num_args(1)
                .default_value("hive"),
        )
        .arg(
            Arg::new("UPLOAD_TO_S3")
                .long("upload-to-s3")
                .help("Whether to upload the distribution to S3")
                .required(true)
                .num_args(1)
                .value_parser(["true", "false"]),
        )
        .arg(
            Arg::new("S3_BUCKET")
                .long("s3-bucket")
                .help("Bucket the distribution is uploaded to")
                .required(false)
                .num_args(1)
                .default_value("hive-dist"),
        )
        .arg(
            Arg::new("START_INSTANCES")
                .long("start-instances")
                .help("Launches new instances instead of describing running ones")
                .required(false)
                .num_args(0),
        )
        .arg(
            Arg::new("DEPLOY")
                .long("deploy")
                .help("Pushes the generated manifests out to the puppetmaster")
                .required(false)
                .num_args(0),
        )
        .arg(
            Arg::new("SPEC_FILE_PATH")
                .long("spec-file-path")
                .short('s')
                .help("The spec file to create")
                .required(true)
                .num_args(1),
        )
}

pub fn execute(opts: spec::DefaultSpecOption) -> io::Result<()> {
    // ref. https://github.com/env-logger-rs/env_logger/issues/47
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, opts.log_level.clone()),
    );

    let spec_file_path = opts.spec_file_path.clone();
    let spec = spec::Spec::default_aws(opts);
    spec.validate()?;
    spec.sync(&spec_file_path)?;

    execute!(
        stdout(),
        SetForegroundColor(Color::Blue),
        Print(format!("\nSaved spec: '{}'\n", spec_file_path)),
        ResetColor
    )?;
    let spec_contents = spec.encode_yaml()?;
    println!("{}\n", spec_contents);

    execute!(
        stdout(),
        SetForegroundColor(Color::Green),
        Print(format!(
            "\nvi {}\nhiveup-aws apply \\\n--spec-file-path {}\n\n",
            spec_file_path, spec_file_path
        )),
        ResetColor
    )?;

    Ok(())
}
