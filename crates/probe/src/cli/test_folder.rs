use chrono::Utc;
use clap::Parser;
use eyre::{Result, WrapErr};
use serde::Serialize;
use url::Url;

use crate::cli::Environment;
use crate::config::{as_container, ServerArgs};
use crate::output::Report;

#[derive(Debug, Parser)]
#[command(about = "Print a fresh, unique container URL for a test run")]
pub struct TestFolderCommand {
    #[command(flatten)]
    pub server: ServerArgs,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TestFolder {
    test_folder: String,
    test_folder_url: Url,
}

impl Report for TestFolder {
    fn report(&self) {
        println!("{}", self.test_folder_url);
    }
}

impl TestFolderCommand {
    pub fn run(&self, environment: &Environment) -> Result<()> {
        let root = as_container(self.server.storage_root()?);
        let test_folder = folder_name(Utc::now().timestamp_millis());
        let test_folder_url = root
            .join(&format!("{test_folder}/"))
            .wrap_err("failed to build test folder URL")?;

        environment.output.write(&TestFolder {
            test_folder,
            test_folder_url,
        });

        Ok(())
    }
}

fn folder_name(millis: i64) -> String {
    format!("solid-crud-tests-{millis}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_sits_directly_under_the_root() {
        let root = as_container("https://localhost:8443/alice".parse().unwrap());

        let url = root.join(&format!("{}/", folder_name(1_700_000_000_000))).unwrap();

        assert_eq!(
            url.as_str(),
            "https://localhost:8443/alice/solid-crud-tests-1700000000000/"
        );
    }
}
