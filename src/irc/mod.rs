use log::{debug, info};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, RwLock};

use crate::config::BotConfig;
use crate::types::{DispatchError, DispatchResult};

pub mod framer;
pub mod listeners;

pub use framer::LineFramer;
pub use listeners::{ListenerCallback, ListenerRegistry};

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Send side of the server connection.
///
/// Cheap to clone; the read loop, handlers and periodic jobs all hold one.
/// Writes go through a single mutex so lines from concurrent senders never
/// interleave.
#[derive(Clone)]
pub struct Client {
    writer: Arc<Mutex<Option<BoxedWriter>>>,
    config: Arc<BotConfig>,
    nick: Arc<RwLock<String>>,
}

impl Client {
    pub fn new(config: Arc<BotConfig>) -> Self {
        let nick = config.nick.clone();
        Self {
            writer: Arc::new(Mutex::new(None)),
            config,
            nick: Arc::new(RwLock::new(nick)),
        }
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    /// Current working nick
    pub async fn nick(&self) -> String {
        self.nick.read().await.clone()
    }

    /// Install the write half of a fresh connection and reset the working nick
    pub async fn attach<W>(&self, writer: W)
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        *self.writer.lock().await = Some(Box::new(writer));
        *self.nick.write().await = self.config.nick.clone();
    }

    /// Shut down and drop the write half, if any
    pub async fn detach(&self) -> DispatchResult<()> {
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            writer.shutdown().await?;
            debug!("Connection write half closed");
        }
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.writer.lock().await.is_some()
    }

    /// Send one protocol line; the `\r\n` terminator is added here
    pub async fn send_raw(&self, line: &str) -> DispatchResult<()> {
        self.write_line(line, line).await
    }

    async fn write_line(&self, line: &str, shown: &str) -> DispatchResult<()> {
        if self.config.verbose {
            info!("> {}", shown);
        } else {
            debug!("> {}", shown);
        }

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(DispatchError::NotConnected)?;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\r\n").await?;
        writer.flush().await?;
        Ok(())
    }

    pub async fn message(&self, target: &str, text: &str) -> DispatchResult<()> {
        self.send_raw(&format!("PRIVMSG {} :{}", target, text)).await
    }

    pub async fn join<S: AsRef<str>>(&self, channels: &[S]) -> DispatchResult<()> {
        self.send_raw(&format!("JOIN {}", join_channels(channels))).await
    }

    pub async fn part<S: AsRef<str>>(&self, channels: &[S]) -> DispatchResult<()> {
        self.send_raw(&format!("PART {}", join_channels(channels))).await
    }

    /// Switch the working nick and announce it to the server
    pub async fn change_nick(&self, nick: &str) -> DispatchResult<()> {
        *self.nick.write().await = nick.to_string();
        self.send_raw(&format!("NICK {}", nick)).await
    }

    /// Registration lines sent right after connecting
    pub async fn register_identity(&self) -> DispatchResult<()> {
        let nick = self.nick().await;
        self.send_raw(&format!("NICK {}", nick)).await?;
        self.send_raw(&format!(
            "USER {} {} 0 :{}",
            self.config.ident, self.config.host, self.config.realname
        ))
        .await
    }

    pub async fn nickserv(&self, text: &str) -> DispatchResult<()> {
        self.message("NickServ", text).await
    }

    pub async fn chanserv(&self, text: &str) -> DispatchResult<()> {
        self.message("ChanServ", text).await
    }

    /// Identify with NickServ; the password never reaches the log
    pub async fn identify(&self, password: &str) -> DispatchResult<()> {
        self.write_line(
            &format!("PRIVMSG NickServ :identify {}", password),
            "PRIVMSG NickServ :identify ********",
        )
        .await
    }
}

fn join_channels<S: AsRef<str>>(channels: &[S]) -> String {
    channels.iter().map(|c| c.as_ref()).collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncBufReadExt, BufReader};

    fn client() -> Client {
        let mut config = BotConfig::new("irc.example.org").with_name("Tester").with_verbose(false);
        config.finalize();
        Client::new(Arc::new(config))
    }

    #[tokio::test]
    async fn test_send_without_connection_fails() {
        let client = client();
        assert!(!client.is_connected().await);
        assert!(matches!(client.send_raw("PING :x").await, Err(DispatchError::NotConnected)));
    }

    #[tokio::test]
    async fn test_wire_format() {
        let client = client();
        let (ours, theirs) = duplex(4096);
        client.attach(ours).await;

        client.register_identity().await.unwrap();
        client.message("#rust", "hello there").await.unwrap();
        client.join(&["#a", "#b"]).await.unwrap();
        client.part(&["#a"]).await.unwrap();
        client.nickserv("info").await.unwrap();
        client.chanserv("op #a").await.unwrap();
        client.identify("hunter2").await.unwrap();
        client.change_nick("Tester_").await.unwrap();
        client.detach().await.unwrap();

        let mut lines = BufReader::new(theirs).lines();
        let mut received = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            received.push(line);
        }

        assert_eq!(
            received,
            vec![
                "NICK Tester",
                "USER tester irc.example.org 0 :pIRC Bot",
                "PRIVMSG #rust :hello there",
                "JOIN #a,#b",
                "PART #a",
                "PRIVMSG NickServ :info",
                "PRIVMSG ChanServ :op #a",
                "PRIVMSG NickServ :identify hunter2",
                "NICK Tester_",
            ]
        );
        assert_eq!(client.nick().await, "Tester_");
        assert!(!client.is_connected().await);
    }

    #[tokio::test]
    async fn test_attach_resets_nick() {
        let client = client();
        let (ours, _theirs) = duplex(1024);
        client.attach(ours).await;
        client.change_nick("Other").await.unwrap();

        let (again, _theirs_again) = duplex(1024);
        client.attach(again).await;
        assert_eq!(client.nick().await, "Tester");
    }
}
