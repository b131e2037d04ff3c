// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod logging;
mod runtime;

use admindesk_app::AppState;
use admindesk_client::Client;
use admindesk_db::{Store, StoredPreference};
use admindesk_testkit::FakeRemote;
use anyhow::{Context, Result};
use config::Config;
use runtime::ApiRuntime;
use std::env;
use std::path::{Path, PathBuf};
use tracing::info;

const DEMO_SEED: u64 = 0x00AD_D35C;

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `admindesk --print-example-config` to generate a v1 template",
            options.config_path.display()
        )
    })?;

    let db_path = if options.demo {
        PathBuf::from(":memory:")
    } else {
        config.db_path()?
    };
    if options.print_db_path {
        println!("{}", db_path.display());
        return Ok(());
    }

    if options.check_only {
        for preference in check(&config, &db_path, options.demo)? {
            println!("{}", describe_preference(&preference));
        }
        println!("ok");
        return Ok(());
    }

    logging::init(config.log_level(), &config.log_file()?)?;
    let store = open_store(&db_path)?;
    let user = config.user_id();
    let mut state = AppState::default();

    if options.demo {
        info!(seed = DEMO_SEED, "starting with demo data");
        let mut runtime =
            ApiRuntime::new(FakeRemote::demo(DEMO_SEED), &store, user, config.page_size());
        return admindesk_tui::run_app(&mut state, &mut runtime);
    }

    let client = build_client(&config, &options.config_path)?;
    info!(base_url = client.base_url(), user = %user, "starting");
    let mut runtime = ApiRuntime::new(client, &store, user, config.page_size());
    admindesk_tui::run_app(&mut state, &mut runtime)
}

fn open_store(db_path: &Path) -> Result<Store> {
    let store = Store::open(db_path).with_context(|| {
        format!(
            "open database {} -- if this path is wrong, set [storage].db_path or ADMINDESK_DB_PATH",
            db_path.display()
        )
    })?;
    store.bootstrap()?;
    Ok(store)
}

fn build_client(config: &Config, config_path: &Path) -> Result<Client> {
    Client::new(config.base_url(), config.timeout()?, config.access_token()).with_context(|| {
        format!(
            "invalid [server] config in {}; fix base_url/timeout values",
            config_path.display()
        )
    })
}

/// Validates config, database, and the API server without starting the TUI.
/// Returns the column preferences stored for the configured user.
fn check(config: &Config, db_path: &Path, demo: bool) -> Result<Vec<StoredPreference>> {
    let store = open_store(db_path)?;
    let preferences = store
        .list_preferences(&config.user_id())
        .context("read stored column preferences")?;
    logging::filter(config.log_level())?;
    if !demo {
        let client = Client::new(config.base_url(), config.timeout()?, config.access_token())?;
        client.ping()?;
    }
    Ok(preferences)
}

fn describe_preference(preference: &StoredPreference) -> String {
    let fields = if preference.fields.is_empty() {
        "(none)".to_owned()
    } else {
        preference.fields.join(", ")
    };
    format!(
        "{} {}: {fields}",
        preference.entity.as_str(),
        preference.kind.as_str()
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    print_config_path: bool,
    print_db_path: bool,
    demo: bool,
    print_example: bool,
    check_only: bool,
    show_help: bool,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        print_config_path: false,
        print_db_path: false,
        demo: false,
        print_example: false,
        check_only: false,
        show_help: false,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-path" => {
                options.print_db_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--demo" => {
                options.demo = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                return Err(anyhow::anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
        }
    }

    Ok(options)
}

fn print_help() {
    println!("admindesk");
    println!("  --config <path>          Use a specific config path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-path             Print resolved preferences database path");
    println!("  --print-example-config   Print a v1 config template");
    println!("  --demo                   Launch against an in-memory demo API");
    println!("  --check                  Validate config, database, and API server, list saved columns, then exit");
    println!("  --help                   Show this help");
}

#[cfg(test)]
mod tests {
    use super::{CliOptions, check, describe_preference, parse_cli_args};
    use crate::config::Config;
    use admindesk_app::{EntityKind, PreferenceKey, PreferenceKind, UserId};
    use admindesk_db::Store;
    use anyhow::{Result, anyhow};
    use std::path::PathBuf;
    use std::thread;
    use tiny_http::{Header, Response, Server};

    fn default_options_path() -> PathBuf {
        PathBuf::from("/tmp/admindesk-config.toml")
    }

    fn config_for(base_url: &str) -> Result<(tempfile::TempDir, Config)> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            format!("version = 1\n[server]\nbase_url = \"{base_url}\"\ntimeout = \"2s\"\n"),
        )?;
        let config = Config::load(&path)?;
        Ok((temp, config))
    }

    #[test]
    fn parse_cli_args_defaults_to_provided_config_path() -> Result<()> {
        let options = parse_cli_args(Vec::<String>::new(), default_options_path())?;
        assert_eq!(
            options,
            CliOptions {
                config_path: default_options_path(),
                print_config_path: false,
                print_db_path: false,
                demo: false,
                print_example: false,
                check_only: false,
                show_help: false,
            }
        );
        Ok(())
    }

    #[test]
    fn parse_cli_args_sets_config_path_override() -> Result<()> {
        let options = parse_cli_args(
            vec!["--config", "/custom/config.toml"],
            default_options_path(),
        )?;
        assert_eq!(options.config_path, PathBuf::from("/custom/config.toml"));
        Ok(())
    }

    #[test]
    fn parse_cli_args_errors_for_missing_config_value() {
        let error = parse_cli_args(vec!["--config"], default_options_path())
            .expect_err("missing config value should fail");
        assert!(error.to_string().contains("--config requires a file path"));
    }

    #[test]
    fn parse_cli_args_errors_for_unknown_argument() {
        let error = parse_cli_args(vec!["--wat"], default_options_path())
            .expect_err("unknown arg should fail");
        let message = error.to_string();
        assert!(message.contains("unknown argument"));
        assert!(message.contains("--help"));
    }

    #[test]
    fn parse_cli_args_sets_flags() -> Result<()> {
        let options = parse_cli_args(
            vec!["--print-config-path", "--demo", "--check", "-h"],
            default_options_path(),
        )?;
        assert!(options.print_config_path);
        assert!(!options.print_db_path);
        assert!(options.demo);
        assert!(!options.print_example);
        assert!(options.check_only);
        assert!(options.show_help);
        Ok(())
    }

    #[test]
    fn check_reaches_a_live_server() -> Result<()> {
        let server =
            Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
        let addr = format!("http://{}", server.server_addr());
        let handle = thread::spawn(move || {
            let request = server.recv().expect("request expected");
            assert!(request.url().starts_with("/roles?"));
            let response = Response::from_string(r#"{"total":0,"limit":1,"skip":0,"data":[]}"#)
                .with_header(
                    Header::from_bytes("Content-Type", "application/json")
                        .expect("valid content type header"),
                );
            request.respond(response).expect("response should succeed");
        });

        let (_temp, config) = config_for(&addr)?;
        check(&config, &PathBuf::from(":memory:"), false)?;
        handle.join().expect("server thread should join");
        Ok(())
    }

    #[test]
    fn check_reports_unreachable_server() -> Result<()> {
        let (_temp, config) = config_for("http://127.0.0.1:1")?;
        let error = check(&config, &PathBuf::from(":memory:"), false)
            .expect_err("nothing listens on port 1");
        assert!(format!("{error:#}").contains("start the API server"));
        Ok(())
    }

    #[test]
    fn demo_check_skips_the_network() -> Result<()> {
        let (_temp, config) = config_for("http://127.0.0.1:1")?;
        assert!(check(&config, &PathBuf::from(":memory:"), true)?.is_empty());
        Ok(())
    }

    #[test]
    fn check_lists_saved_columns_for_the_configured_user() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config_path = temp.path().join("config.toml");
        let db_path = temp.path().join("prefs.db");
        std::fs::write(&config_path, "version = 1\n[user]\nid = \"ops\"\n")?;
        let config = Config::load(&config_path)?;

        let store = Store::open(&db_path)?;
        store.bootstrap()?;
        store.put_preference(
            &PreferenceKey::new(
                &UserId::from("ops"),
                EntityKind::Roles,
                PreferenceKind::HideFields,
            ),
            &["description".to_owned(), "isDefault".to_owned()],
        )?;
        store.put_preference(
            &PreferenceKey::new(
                &UserId::from("someone-else"),
                EntityKind::Roles,
                PreferenceKind::FilterFields,
            ),
            &["name".to_owned()],
        )?;
        drop(store);

        let listed = check(&config, &db_path, true)?;
        let lines: Vec<String> = listed.iter().map(describe_preference).collect();
        assert_eq!(lines, vec!["roles hideFields: description, isDefault".to_owned()]);
        Ok(())
    }
}
