use anyhow::{Result, anyhow};

use super::{RunArgs, load_settings};
use crate::core::account::{UNKNOWN_NAME, load_accounts};
use crate::core::proxy::ProxyPool;
use crate::core::terminal::{
    print_error, print_info, print_status, print_step, print_success, print_warn,
};

/// Offline sanity check of everything a run needs. Fails when a run would fail at startup.
pub async fn run_check(args: &RunArgs) -> Result<()> {
    print_step("Checking farmhand setup...");
    println!();

    let config = load_settings(args).await?;
    print_success("Configuration is valid.");
    print_status("API", &config.api.base_url);
    print_status("Wake policy", &format!("{:?}", config.schedule.wake_policy));
    print_status("Log file", &config.log.file.display().to_string());

    let mut problems = 0;

    match load_accounts(&config.files.accounts).await {
        Ok(accounts) if accounts.is_empty() => {
            print_warn(&format!(
                "{} has no accounts; cycles will do nothing.",
                config.files.accounts.display()
            ));
        }
        Ok(accounts) => {
            print_success(&format!(
                "{} account(s) in {}",
                accounts.len(),
                config.files.accounts.display()
            ));
            for account in &accounts {
                print_status(&format!("Account {}", account.position()), &account.name);
            }
            let unnamed = accounts.iter().filter(|a| a.name == UNKNOWN_NAME).count();
            if unnamed > 0 {
                print_warn(&format!(
                    "{} account(s) have no readable first_name in their payload.",
                    unnamed
                ));
            }
        }
        Err(e) => {
            print_error(&format!("{:#}", e));
            problems += 1;
        }
    }

    if config.files.proxies.exists() {
        let proxies = ProxyPool::load(&config.files.proxies).await;
        print_success(&format!(
            "{} proxy endpoint(s) in {}",
            proxies.len(),
            config.files.proxies.display()
        ));
    } else {
        print_info("No proxy file; accounts will connect directly.");
    }

    if config.telegram.credentials().is_some() {
        print_success("Telegram reporting is configured.");
    } else {
        print_info("Telegram reporting is off (set TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID).");
    }

    println!();
    if problems > 0 {
        return Err(anyhow!("{} problem(s) found", problems));
    }
    print_success("Ready to farm.");
    Ok(())
}
