//! Widget-side conversation channel
//!
//! The embedded chatbot keeps one conversation open with its visitor. New
//! message rows are decoded and handed to the caller as they arrive, and
//! replies from either side are written straight to the messages table.

use anyhow::{Result, anyhow};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex};

use super::LiveBinding;
use crate::gateway::{
    ChangeCallback, ChangeFeed, Row, RowGateway, Subscription, Table, from_row, to_row,
};
use crate::models::{ConversationId, Message, NewMessage};

/// One live conversation channel for the chatbot widget
pub struct ChatbotSocket {
    feed: Arc<dyn ChangeFeed>,
    gateway: Arc<dyn RowGateway>,
    channel: Mutex<Option<Subscription>>,
}

impl ChatbotSocket {
    pub fn new(feed: Arc<dyn ChangeFeed>, gateway: Arc<dyn RowGateway>) -> Self {
        Self {
            feed,
            gateway,
            channel: Mutex::new(None),
        }
    }

    /// Deliver every message inserted into `conversation_id` to `on_message`.
    ///
    /// Connecting again replaces the previous channel.
    pub fn connect(
        &self,
        conversation_id: &ConversationId,
        on_message: impl Fn(Message) + Send + Sync + 'static,
    ) -> Result<()> {
        let mut channel = self
            .channel
            .lock()
            .map_err(|_| anyhow!("socket state lock poisoned"))?;
        if let Some(previous) = channel.take() {
            previous.cancel();
        }

        let callback: ChangeCallback = Arc::new(move |row: &Row| {
            match from_row::<Message>(Table::Messages, row.clone()) {
                Ok(message) => on_message(message),
                Err(e) => warn!("Dropping undecodable message row: {:#}", e),
            }
        });
        let binding = LiveBinding::messages(conversation_id);
        *channel = Some(self.feed.subscribe(binding.subscription, callback)?);
        info!("Widget channel open for {}", conversation_id);
        Ok(())
    }

    /// Close the channel. Disconnecting twice does nothing.
    pub fn disconnect(&self) {
        let previous = match self.channel.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(subscription) = previous {
            subscription.cancel();
            debug!("Widget channel closed");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.channel
            .lock()
            .map(|c| c.as_ref().is_some_and(Subscription::is_active))
            .unwrap_or(false)
    }

    /// Write a message from the visitor or the bot and return it as stored
    pub fn send_message(&self, message: &NewMessage) -> Result<Message> {
        let row = self.gateway.insert(Table::Messages, to_row(message)?)?;
        from_row(Table::Messages, row)
    }
}

impl Drop for ChatbotSocket {
    fn drop(&mut self) {
        self.disconnect();
    }
}
