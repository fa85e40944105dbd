//! The identity pool: webhook handles cycled between authors.

use crate::error::HostError;
use crate::host::{self, ChatHost};
use crate::{AuthorRef, Destination, Identity};

/// Destination-bound pool of impersonation handles.
///
/// `active` holds handles currently presenting as some author, kept in
/// recency order with the most recent last. `spare` holds handles not yet
/// claimed by anyone. A handle lives in exactly one of the two lists.
pub struct IdentityPool {
    dest: Destination,
    active: Vec<Identity>,
    spare: Vec<Identity>,
}

impl IdentityPool {
    /// An empty pool bound to a destination.
    pub fn new(dest: Destination) -> Self {
        Self {
            dest,
            active: Vec::new(),
            spare: Vec::new(),
        }
    }

    /// A pool seeded with the bot's pre-existing webhooks on the
    /// destination, adopted as spares so repeated copies do not accrete
    /// new ones.
    pub async fn bootstrap<H: ChatHost>(host: &H, dest: Destination) -> Result<Self, HostError> {
        let spare = host.fetch_identities(&dest).await?;
        tracing::debug!(
            channel = dest.webhook_channel(),
            adopted = spare.len(),
            "identity pool bootstrapped"
        );
        Ok(Self {
            dest,
            active: Vec::new(),
            spare,
        })
    }

    /// Resolve a handle presenting as `author`.
    ///
    /// In order: reuse an active handle that already matches, claim and
    /// rewrite a spare, create a fresh handle, or rewrite the least
    /// recently used active handle when the platform refuses to create
    /// more. `None` means impersonation is unavailable for this author
    /// and the caller should fall back to plain attribution.
    pub async fn resolve<H: ChatHost>(&mut self, host: &H, author: &AuthorRef) -> Option<&Identity> {
        if let Some(index) = self.active.iter().position(|identity| identity.matches(author)) {
            let identity = self.active.remove(index);
            self.active.push(identity);
            return self.active.last();
        }

        // Creation is only attempted once the spares are gone.
        if self.spare.is_empty() {
            match host::with_retries("create_identity", || {
                host.create_identity(&self.dest, &author.display_name, author.avatar_url.as_deref())
            })
            .await
            {
                Ok(identity) => {
                    self.active.push(identity);
                    return self.active.last();
                }
                Err(error) => {
                    tracing::debug!(
                        %error,
                        channel = self.dest.webhook_channel(),
                        "webhook creation refused, repurposing an existing handle"
                    );
                }
            }
        }

        let mut identity = if !self.spare.is_empty() {
            self.spare.remove(0)
        } else if !self.active.is_empty() {
            self.active.remove(0)
        } else {
            tracing::warn!(
                channel = self.dest.webhook_channel(),
                "no webhook available to repurpose"
            );
            return None;
        };

        if let Err(error) = host::with_retries("edit_identity", || {
            host.edit_identity(&identity, &author.display_name, author.avatar_url.as_deref())
        })
        .await
        {
            tracing::warn!(
                %error,
                author = %author.display_name,
                "webhook edit failed, falling back to plain attribution"
            );
            // The handle keeps its old face but stays deletable.
            self.spare.push(identity);
            return None;
        }

        identity.name = author.display_name.clone();
        identity.avatar = author.avatar_url.clone();
        self.active.push(identity);
        self.active.last()
    }

    /// Delete every handle the pool holds, created and adopted alike.
    /// Individual failures are logged and skipped.
    pub async fn destroy<H: ChatHost>(mut self, host: &H) {
        for identity in self.active.drain(..).chain(self.spare.drain(..)) {
            if let Err(error) = host.delete_identity(&identity).await {
                tracing::warn!(%error, webhook = identity.id, "failed to delete webhook");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn handle_count(&self) -> usize {
        self.active.len() + self.spare.len()
    }
}
