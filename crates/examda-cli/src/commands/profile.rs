use examda_core::services::{ProfileSnapshot, ProfileSource};

use crate::cli::{InventoryCommands, ShopCommands};
use crate::commands::common::App;
use crate::error::CliError;

pub async fn run_profile(as_json: bool, app: &App) -> Result<(), CliError> {
    let Some(snapshot) = app.profiles.profile().await? else {
        return Err(CliError::NotSignedIn);
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        for line in format_profile_lines(&snapshot) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn format_profile_lines(snapshot: &ProfileSnapshot) -> Vec<String> {
    let profile = &snapshot.cached.profile;
    let mut lines = vec![
        format!("name:       {}", profile.display_name()),
        format!("student id: {}", profile.student_id),
        format!("email:      {}", profile.email),
        format!("coins:      {}", profile.coin),
    ];
    if let Some(item) = profile.equipped_item.as_ref() {
        lines.push(format!("equipped:   {} (#{})", item.name, item.id));
    }
    if snapshot.source == ProfileSource::Cache {
        lines.push(format!(
            "(offline copy from {})",
            snapshot.cached.updated_at.format("%Y-%m-%d %H:%M UTC")
        ));
    }
    lines
}

pub async fn run_password(new_password: &str, app: &App) -> Result<(), CliError> {
    app.profiles.change_password(new_password).await?;
    println!("Password changed");
    Ok(())
}

pub async fn run_shop(command: Option<ShopCommands>, app: &App) -> Result<(), CliError> {
    match command {
        None => {
            let items = app.profiles.shop_items().await?;
            if items.is_empty() {
                println!("The shop is empty.");
            }
            for item in items {
                let owned = if item.is_purchased == Some(true) {
                    "  owned"
                } else {
                    ""
                };
                println!("{:<4}  {:<24}  {:>5} coins{owned}", item.id, item.name, item.price);
            }
        }
        Some(ShopCommands::Buy { item_id }) => {
            let receipt = app.profiles.purchase(item_id).await?;
            println!("{} ({})", receipt.message, receipt.item.name);
        }
    }
    Ok(())
}

pub async fn run_inventory(command: Option<InventoryCommands>, app: &App) -> Result<(), CliError> {
    match command {
        None => {
            let items = app.profiles.inventory().await?;
            if items.is_empty() {
                println!("No items owned.");
            }
            for item in items {
                let equipped = if item.is_equipped { "  equipped" } else { "" };
                println!("{:<4}  {:<24}{equipped}", item.id, item.name);
            }
        }
        Some(InventoryCommands::Equip { item_id }) => {
            let receipt = app.profiles.equip(item_id).await?;
            println!("{}", receipt.message);
        }
        Some(InventoryCommands::Unequip) => {
            app.profiles.unequip().await?;
            println!("Item unequipped");
        }
    }
    Ok(())
}
