mod apply;
mod default_spec;
mod delete;
mod scp;

use std::io;

use clap::{crate_version, Command};

const APP_NAME: &str = "hiveup-aws";

#[tokio::main]
async fn main() -> io::Result<()> {
    let matches = Command::new(APP_NAME)
        .version(crate_version!())
        .about("Hive fleet control plane on AWS")
        .subcommands(vec![
            default_spec::command(),
            apply::command(),
            delete::command(),
        ])
        .get_matches();

    match matches.subcommand() {
        Some((default_spec::NAME, sub_matches)) => {
            let opts = hive_ops::aws::spec::DefaultSpecOption {
                log_level: sub_matches
                    .get_one::<String>("LOG_LEVEL")
                    .unwrap_or(&String::from("info"))
                    .clone(),
                id: sub_matches.get_one::<String>("ID").unwrap().clone(),
                endpoint: sub_matches.get_one::<String>("ENDPOINT").unwrap().clone(),
                availability_zone: sub_matches
                    .get_one::<String>("AVAILABILITY_ZONE")
                    .unwrap_or(&String::new())
                    .clone(),
                ec2_key_name: sub_matches
                    .get_one::<String>("EC2_KEY_NAME")
                    .unwrap_or(&String::new())
                    .clone(),
                image_id: sub_matches
                    .get_one::<String>("IMAGE_ID")
                    .unwrap_or(&String::new())
                    .clone(),
                instance_count: *sub_matches.get_one::<u32>("INSTANCE_COUNT").unwrap_or(&0),
                instance_type: sub_matches
                    .get_one::<String>("INSTANCE_TYPE")
                    .unwrap_or(&String::new())
                    .clone(),
                repo_url: sub_matches
                    .get_one::<String>("REPO_URL")
                    .unwrap_or(&String::new())
                    .clone(),
                puppetmaster_host: sub_matches
                    .get_one::<String>("PUPPETMASTER_HOST")
                    .unwrap()
                    .clone(),
                drop_user: sub_matches.get_one::<String>("DROP_USER").unwrap().clone(),
                drop_password: sub_matches
                    .get_one::<String>("DROP_PASSWORD")
                    .unwrap_or(&String::new())
                    .clone(),
                dist_dir: sub_matches
                    .get_one::<String>("DIST_DIR")
                    .unwrap_or(&String::new())
                    .clone(),
                dist_prefix: sub_matches
                    .get_one::<String>("DIST_PREFIX")
                    .unwrap()
                    .clone(),
                upload_to_s3: sub_matches
                    .get_one::<String>("UPLOAD_TO_S3")
                    .unwrap()
                    .eq("true"),
                s3_bucket: sub_matches.get_one::<String>("S3_BUCKET").unwrap().clone(),
                start_instances: sub_matches.get_flag("START_INSTANCES"),
                deploy: sub_matches.get_flag("DEPLOY"),
                spec_file_path: sub_matches
                    .get_one::<String>("SPEC_FILE_PATH")
                    .unwrap()
                    .clone(),
            };
            default_spec::execute(opts)?;
        }

        Some((apply::NAME, sub_matches)) => {
            apply::execute(
                &sub_matches
                    .get_one::<String>("LOG_LEVEL")
                    .unwrap_or(&String::from("info"))
                    .clone(),
                &sub_matches
                    .get_one::<String>("SPEC_FILE_PATH")
                    .unwrap()
                    .clone(),
                sub_matches.get_flag("SKIP_PROMPT"),
            )
            .await?;
        }

        Some((delete::NAME, sub_matches)) => {
            delete::execute(
                &sub_matches
                    .get_one::<String>("LOG_LEVEL")
                    .unwrap_or(&String::from("info"))
                    .clone(),
                &sub_matches
                    .get_one::<String>("SPEC_FILE_PATH")
                    .unwrap()
                    .clone(),
                sub_matches.get_flag("SKIP_PROMPT"),
            )
            .await?;
        }

        _ => unreachable!("unknown subcommand"),
    }

    Ok(())
}
