use super::{parse_reply_line, ping_command, EchoReply};
use crate::error::Result;
use crate::process::{read_line, ToolProcess};
use crate::sys::Platform;
use crate::trace::sweep::EchoProbe;
use std::net::IpAddr;
use std::time::Duration;
use tokio::io::AsyncBufRead;
use tracing::debug;

/// Slack on top of the echo timeout for `ping` to start and exit.
const LAUNCH_GRACE: Duration = Duration::from_secs(2);

/// Sends single TTL-limited echoes through the system `ping` utility.
#[derive(Clone, Debug)]
pub struct Pinger {
    /// Platform whose `ping` flags are used.
    pub platform: Platform,
    /// Destination IP address.
    pub dst_ip: IpAddr,
    /// Timeout for receiving each echo. Default is 1 second.
    pub receive_timeout: Duration,
}

impl Pinger {
    /// Creates a new `Pinger` for the destination address.
    pub fn new(dst_ip: IpAddr) -> Pinger {
        Pinger {
            platform: Platform::current(),
            dst_ip,
            receive_timeout: Duration::from_secs(1),
        }
    }
    /// Sends one echo with `ttl` and classifies the first answer.
    pub async fn ping_ttl(&self, ttl: u8) -> Result<EchoReply> {
        let (program, args) = ping_command(&self.platform, self.dst_ip, ttl, self.receive_timeout);
        let mut tool = ToolProcess::spawn(program, &args)?;
        let wait = self.receive_timeout + LAUNCH_GRACE;
        let reply = match tokio::time::timeout(wait, first_reply(tool.stdout())).await {
            Ok(Ok(Some(reply))) => reply,
            Ok(Ok(None)) => EchoReply::NoReply,
            Ok(Err(e)) => {
                debug!(ttl, error = %e, "reading ping output failed");
                EchoReply::NoReply
            }
            Err(_) => {
                debug!(ttl, ?wait, "ping did not finish in time");
                EchoReply::NoReply
            }
        };
        tool.kill().await;
        Ok(reply)
    }
    /// Sets the platform whose `ping` flags are used.
    pub fn set_platform(&mut self, platform: Platform) {
        self.platform = platform;
    }
    /// Sets the destination IP address.
    pub fn set_dst_ip(&mut self, dst_ip: IpAddr) {
        self.dst_ip = dst_ip;
    }
    /// Returns the destination IP address.
    pub fn get_dst_ip(&self) -> IpAddr {
        self.dst_ip
    }
    /// Sets the per-echo receive timeout.
    pub fn set_receive_timeout(&mut self, receive_timeout: Duration) {
        self.receive_timeout = receive_timeout;
    }
    /// Returns the per-echo receive timeout.
    pub fn get_receive_timeout(&self) -> Duration {
        self.receive_timeout
    }
}

impl EchoProbe for Pinger {
    async fn probe(&self, ttl: u8) -> Result<EchoReply> {
        self.ping_ttl(ttl).await
    }
}

// First line of output that classifies as a reply.
async fn first_reply<R: AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<Option<EchoReply>> {
    let mut buf: Vec<u8> = vec![];
    while let Some(line) = read_line(reader, &mut buf).await? {
        if let Some(reply) = parse_reply_line(&line) {
            return Ok(Some(reply));
        }
    }
    Ok(None)
}
