use std::{
    fs::{self, File},
    io::{self, Error, ErrorKind, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};

pub const VERSION: usize = 1;

/// Default key-pair name for instance SSH access.
pub const DEFAULT_EC2_KEY_NAME: &str = "eu-kp-1";
/// Default host that receives generated puppet manifests.
pub const DEFAULT_PUPPETMASTER: &str = "punch.kc.talis.local";
/// Default remote user for the manifest drop.
pub const DEFAULT_DROP_USER: &str = "puppetdrop";

/// Represents the deployment-level configuration shared by every
/// subcommand. The user is expected to generate this once with
/// "default-spec" and feed it to "apply"/"delete".
/// Immutable after load; "Clone" is for deep-copying.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "snake_case")]
pub struct Spec {
    #[serde(default)]
    pub version: usize,

    /// User-provided deployment group name.
    /// Doubles as the EC2 security group name and the
    /// basename of the generated puppet manifests.
    #[serde(default)]
    pub id: String,

    /// AWS resources to provision or reuse.
    pub resource: Resource,
    /// Defines how the underlying instances are set up.
    pub machine: Machine,
    /// Puppet controller the manifests are pushed to.
    pub puppet: Puppet,
    /// Software distribution to locate and ship with the manifests.
    pub distribution: Distribution,
    /// Output file paths for the generated manifests.
    #[serde(default)]
    pub output: Output,

    /// Set "true" to launch new instances; "false" reuses whatever
    /// is already running in the security group.
    #[serde(default)]
    pub start_instances: bool,
    /// Set "true" to push manifests (and the distribution) out to the
    /// puppetmaster once generated.
    #[serde(default)]
    pub deploy: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "snake_case")]
pub struct Resource {
    /// Region endpoint selector, "US" or "EU".
    #[serde(default)]
    pub endpoint: String,
    /// Availability zone, e.g. "eu-west-1a".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    #[serde(default)]
    pub ec2_key_name: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "snake_case")]
pub struct Machine {
    /// Machine image to boot.
    #[serde(default)]
    pub image_id: String,
    /// Number of instances to launch and wait for.
    #[serde(default)]
    pub instance_count: u32,
    /// EC2 instance type, e.g. "m5.large".
    #[serde(default)]
    pub instance_type: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "snake_case")]
pub struct Puppet {
    /// Repository URL interpolated into the generated manifest.
    #[serde(default)]
    pub repo_url: String,
    #[serde(default)]
    pub puppetmaster_host: String,
    #[serde(default)]
    pub drop_user: String,
    #[serde(default)]
    pub drop_password: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "snake_case")]
pub struct Distribution {
    /// Directory scanned for the "{prefix}-*.tar.gz" archive.
    #[serde(default)]
    pub dir: String,
    #[serde(default)]
    pub prefix: String,
    /// Set "true" to upload the archive to S3 instead of
    /// scp-ing it to the puppetmaster.
    #[serde(default)]
    pub upload_to_s3: bool,
    #[serde(default)]
    pub s3_bucket: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "snake_case")]
pub struct Output {
    #[serde(default)]
    pub seed_file: String,
    #[serde(default)]
    pub proxy_file: String,
    #[serde(default)]
    pub address_file: String,
    #[serde(default)]
    pub demo_nodes_file: String,
    #[serde(default)]
    pub monitoring_file: String,
    #[serde(default)]
    pub cssh_file: String,
}

impl Default for Output {
    fn default() -> Self {
        Self {
            seed_file: String::from(".seedlist"),
            proxy_file: String::from("proxy.serverlist"),
            address_file: String::from("graph.addressConversion"),
            demo_nodes_file: String::from("demoNodes.js"),
            monitoring_file: String::from("ganglia-partial.conf"),
            cssh_file: String::from("cssh.sh"),
        }
    }
}

/// Defaults to the "default-spec" command-line flag values.
#[derive(Debug, Clone)]
pub struct DefaultSpecOption {
    pub log_level: String,
    pub id: String,
    pub endpoint: String,
    pub availability_zone: String,
    pub ec2_key_name: String,
    pub image_id: String,
    pub instance_count: u32,
    pub instance_type: String,
    pub repo_url: String,
    pub puppetmaster_host: String,
    pub drop_user: String,
    pub drop_password: String,
    pub dist_dir: String,
    pub dist_prefix: String,
    pub upload_to_s3: bool,
    pub s3_bucket: String,
    pub start_instances: bool,
    pub deploy: bool,
    pub spec_file_path: String,
}

impl Spec {
    /// Creates a default spec from the command-line options.
    pub fn default_aws(opts: DefaultSpecOption) -> Self {
        let availability_zone = if opts.availability_zone.is_empty() {
            None
        } else {
            Some(opts.availability_zone.clone())
        };
        let ec2_key_name = if opts.ec2_key_name.is_empty() {
            String::from(DEFAULT_EC2_KEY_NAME)
        } else {
            opts.ec2_key_name.clone()
        };

        Self {
            version: VERSION,
            id: opts.id.clone(),
            resource: Resource {
                endpoint: opts.endpoint.clone(),
                availability_zone,
                ec2_key_name,
            },
            machine: Machine {
                image_id: opts.image_id.clone(),
                instance_count: opts.instance_count,
                instance_type: opts.instance_type.clone(),
            },
            puppet: Puppet {
                repo_url: opts.repo_url.clone(),
                puppetmaster_host: opts.puppetmaster_host.clone(),
                drop_user: opts.drop_user.clone(),
                drop_password: opts.drop_password.clone(),
            },
            distribution: Distribution {
                dir: opts.dist_dir.clone(),
                prefix: opts.dist_prefix.clone(),
                upload_to_s3: opts.upload_to_s3,
                s3_bucket: opts.s3_bucket,
            },
            output: Output::default(),
            start_instances: opts.start_instances,
            deploy: opts.deploy,
        }
    }

    /// Maps the endpoint selector to the concrete AWS region.
    pub fn region(&self) -> io::Result<String> {
        match self.resource.endpoint.as_str() {
            "EU" => Ok(String::from("eu-west-1")),
            "US" => Ok(String::from("us-east-1")),
            other => Err(Error::new(
                ErrorKind::InvalidInput,
                format!("unknown endpoint '{}' (expected US or EU)", other),
            )),
        }
    }

    pub fn encode_yaml(&self) -> io::Result<String> {
        match serde_yaml::to_string(self) {
            Ok(s) => Ok(s),
            Err(e) => Err(Error::new(
                ErrorKind::Other,
                format!("failed to serialize Spec to YAML {}", e),
            )),
        }
    }

    /// Saves the current spec to disk
    /// and overwrites the file.
    pub fn sync(&self, file_path: &str) -> io::Result<()> {
        log::info!("syncing Spec to '{}'", file_path);

        let path = Path::new(file_path);
        if let Some(parent_dir) = path.parent() {
            fs::create_dir_all(parent_dir)?;
        }

        let d = serde_yaml::to_string(self).map_err(|e| {
            Error::new(
                ErrorKind::Other,
                format!("failed to serialize Spec to YAML {}", e),
            )
        })?;

        let mut f = File::create(file_path)?;
        f.write_all(d.as_bytes())
    }

    pub fn load(file_path: &str) -> io::Result<Self> {
        log::info!("loading Spec from {}", file_path);

        if !Path::new(file_path).exists() {
            return Err(Error::new(
                ErrorKind::NotFound,
                format!("file {} does not exists", file_path),
            ));
        }

        let f = File::open(file_path).map_err(|e| {
            Error::new(
                ErrorKind::Other,
                format!("failed to open {} ({})", file_path, e),
            )
        })?;
        serde_yaml::from_reader(f)
            .map_err(|e| Error::new(ErrorKind::InvalidInput, format!("invalid YAML: {}", e)))
    }

    /// Validates the spec.
    pub fn validate(&self) -> io::Result<()> {
        log::info!("validating Spec");

        if self.version != VERSION {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("version unexpected {}, expected {}", self.version, VERSION),
            ));
        }

        if self.id.is_empty() {
            return Err(Error::new(ErrorKind::InvalidInput, "'id' cannot be empty"));
        }
        // the group name keys the generated manifest node blocks
        // where a period would break puppet node matching
        if self.id.contains('.') {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("'id' must not contain periods (got '{}')", self.id),
            ));
        }

        self.region()?;

        if self.machine.instance_count == 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "'machine.instance_count' cannot be 0",
            ));
        }
        if self.start_instances {
            if self.machine.image_id.is_empty() {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    "'machine.image_id' cannot be empty when starting instances",
                ));
            }
            if self.machine.instance_type.is_empty() {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    "'machine.instance_type' cannot be empty when starting instances",
                ));
            }
        }

        if self.distribution.dir.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "'distribution.dir' cannot be empty",
            ));
        }
        if self.distribution.prefix.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "'distribution.prefix' cannot be empty",
            ));
        }
        if self.distribution.upload_to_s3 && self.distribution.s3_bucket.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "'distribution.s3_bucket' cannot be empty when 'upload_to_s3'",
            ));
        }

        if self.deploy {
            if self.puppet.repo_url.is_empty() {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    "'puppet.repo_url' cannot be empty when deploying",
                ));
            }
            if self.puppet.puppetmaster_host.is_empty() {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    "'puppet.puppetmaster_host' cannot be empty when deploying",
                ));
            }
        }

        Ok(())
    }
}

/// RUST_LOG=debug cargo test --package hive-ops --lib -- aws::spec::test_spec --exact --show-output
#[test]
fn test_spec() {
    use std::io::Write as _;

    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    let contents = r#"

version: 1

id: hive-dev

resource:
  endpoint: EU
  availability_zone: eu-west-1a
  ec2_key_name: eu-kp-1

machine:
  image_id: ami-0abcd1234
  instance_count: 10
  instance_type: m5.large

puppet:
  repo_url: hive.s3.amazonaws.com
  puppetmaster_host: punch.kc.talis.local
  drop_user: puppetdrop
  drop_password: secret

distribution:
  dir: /tmp/dist
  prefix: hive
  upload_to_s3: true
  s3_bucket: hive-dist

start_instances: true
deploy: true

"#;
    let mut f = tempfile::NamedTempFile::new().unwrap();
    let ret = f.write_all(contents.as_bytes());
    assert!(ret.is_ok());
    let spec_path = f.path().to_str().unwrap();

    let spec = Spec::load(spec_path).unwrap();
    spec.validate().unwrap();

    assert_eq!(spec.id, "hive-dev");
    assert_eq!(spec.region().unwrap(), "eu-west-1");
    assert_eq!(spec.machine.instance_count, 10);
    assert_eq!(spec.output.seed_file, ".seedlist");
    assert_eq!(spec.output.proxy_file, "proxy.serverlist");
    assert_eq!(spec.output.cssh_file, "cssh.sh");

    // round-trip
    let tmp_dir = tempfile::tempdir().unwrap();
    let synced = tmp_dir.path().join("hive-dev.yaml");
    let synced = synced.as_os_str().to_str().unwrap();
    spec.sync(synced).unwrap();
    let reloaded = Spec::load(synced).unwrap();
    assert_eq!(spec, reloaded);
}

/// RUST_LOG=debug cargo test --package hive-ops --lib -- aws::spec::test_spec_invalid --exact --show-output
#[test]
fn test_spec_invalid() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    let opts = DefaultSpecOption {
        log_level: String::from("info"),
        id: String::from("hive-dev"),
        endpoint: String::from("EU"),
        availability_zone: String::new(),
        ec2_key_name: String::new(),
        image_id: String::from("ami-0abcd1234"),
        instance_count: 5,
        instance_type: String::from("m5.large"),
        repo_url: String::from("hive.s3.amazonaws.com"),
        puppetmaster_host: String::from(DEFAULT_PUPPETMASTER),
        drop_user: String::from(DEFAULT_DROP_USER),
        drop_password: String::from("secret"),
        dist_dir: String::from("/tmp/dist"),
        dist_prefix: String::from("hive"),
        upload_to_s3: false,
        s3_bucket: String::from("hive-dist"),
        start_instances: true,
        deploy: false,
        spec_file_path: String::new(),
    };

    let spec = Spec::default_aws(opts.clone());
    spec.validate().unwrap();
    assert_eq!(spec.resource.ec2_key_name, DEFAULT_EC2_KEY_NAME);

    // group names must not contain full stops
    let mut bad = spec.clone();
    bad.id = String::from("hive.dev");
    assert!(bad.validate().is_err());

    let mut bad = spec.clone();
    bad.resource.endpoint = String::from("AP");
    assert!(bad.validate().is_err());

    let mut bad = spec.clone();
    bad.machine.instance_count = 0;
    assert!(bad.validate().is_err());

    let mut bad = spec;
    bad.deploy = true;
    bad.puppet.repo_url = String::new();
    assert!(bad.validate().is_err());
}
