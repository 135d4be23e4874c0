use crate::cli::AuthCommands;
use crate::commands::common::App;
use crate::error::CliError;

pub async fn run_auth(command: AuthCommands, app: &App) -> Result<(), CliError> {
    match command {
        AuthCommands::Login {
            student_id,
            password,
        } => {
            let response = app.profiles.login(&student_id, &password).await?;
            app.tokens
                .save(&response.access_token)
                .map_err(CliError::Credentials)?;
            println!(
                "Signed in as {} ({})",
                response.user.display_name(),
                response.user.student_id
            );
            Ok(())
        }
        AuthCommands::Status => {
            let token = app.tokens.load().map_err(CliError::Credentials)?;
            let cached = app.store.cached_profile().await?;
            match (token, cached) {
                (Some(_), Some(cached)) => println!(
                    "Signed in to {} as {}",
                    app.config.api_base_url,
                    cached.profile.display_name()
                ),
                (Some(_), None) => println!("Signed in to {}", app.config.api_base_url),
                (None, _) => println!("Not signed in to {}", app.config.api_base_url),
            }
            Ok(())
        }
        AuthCommands::Logout => {
            app.profiles.logout().await?;
            app.tokens.clear().map_err(CliError::Credentials)?;
            println!("Signed out and cleared local data");
            Ok(())
        }
    }
}
