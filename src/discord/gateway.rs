//! Gateway wiring: the serenity client, its event handler, and global
//! command registration.

use crate::config::Config;
use crate::discord::commands;
use crate::relay::CopyRegistry;
use anyhow::Context as _;
use serenity::all::{
    ActivityData, Command, Context, EventHandler, GatewayIntents, Interaction, Ready,
};
use std::sync::Arc;

struct Handler {
    registry: CopyRegistry,
    config: Arc<Config>,
}

#[async_trait::async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        ctx.set_activity(Some(ActivityData::playing(self.config.discord.activity.as_str())));

        if self.config.discord.register_commands {
            match Command::set_global_commands(&ctx.http, commands::definitions()).await {
                Ok(registered) => {
                    tracing::info!(count = registered.len(), "registered global commands");
                }
                Err(error) => tracing::error!(%error, "global command registration failed"),
            }
        }

        tracing::info!(
            user = %ready.user.name,
            guilds = ready.guilds.len(),
            "discord gateway ready"
        );
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            commands::dispatch(&ctx, &command, &self.registry, &self.config).await;
        }
    }
}

/// Connect to the gateway and serve commands until the client exits.
pub async fn run(config: Arc<Config>) -> crate::Result<()> {
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_WEBHOOKS;

    let handler = Handler {
        registry: CopyRegistry::new(),
        config: config.clone(),
    };

    let mut client = serenity::Client::builder(&config.discord.token, intents)
        .event_handler(handler)
        .await
        .context("failed to build discord client")?;

    client
        .start()
        .await
        .context("discord client exited with an error")?;
    Ok(())
}
