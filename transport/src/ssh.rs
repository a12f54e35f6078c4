//! SSH tunnel setup (§4.6). Mirrors the teacher's own `setup_ssh_session`
//! (`transport::setup_ssh_session`, née `remote::setup_ssh_session`) for
//! building the `ssh://` destination string and connecting, then adds the
//! local port-forward to the exec-side listener this system needs (the
//! teacher instead spawns a remote binary over the session — we just need a
//! forwarded TCP socket).

use anyhow::Context;

/// The fixed port the exec-side supervisor listens on (§4.6, §6).
pub const EXEC_LISTEN_PORT: u16 = 52666;

#[derive(Debug, Clone)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl From<&common::DevProfile> for SshTarget {
    fn from(profile: &common::DevProfile) -> Self {
        Self {
            host: profile.remote_host.clone(),
            port: profile.remote_port,
            username: profile.ssh_username.clone(),
            password: profile.ssh_password.clone(),
        }
    }
}

fn destination(target: &SshTarget) -> String {
    format!(
        "ssh://{}@{}:{}",
        target.username, target.host, target.port
    )
}

/// Picks a free local port by binding to port 0 and releasing it. Racy in
/// principle, but the standard trick for "ask the OS for an ephemeral port"
/// when the consumer (here, `ssh -L`) needs a concrete number up front.
fn pick_ephemeral_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")
        .context("failed to bind an ephemeral local port")?;
    Ok(listener.local_addr()?.port())
}

/// Opens an SSH session to `target` and requests a local port-forward from
/// a freshly-picked ephemeral local port to `127.0.0.1:52666` on the remote
/// host. The session must be kept alive for as long as the forward is
/// needed; dropping it tears the forward down.
///
/// Password-based authentication is delegated to the system `ssh` binary
/// that the `openssh` crate shells out to (e.g. via `sshpass` or an
/// `SSH_ASKPASS` helper) — implementing the SSH protocol itself is out of
/// scope (§1).
pub async fn open_tunnel(target: &SshTarget) -> anyhow::Result<(openssh::Session, u16)> {
    let destination = destination(target);
    tracing::debug!(%destination, "connecting SSH session");
    let session = openssh::Session::connect(&destination, openssh::KnownHosts::Accept)
        .await
        .context("failed to establish SSH connection")?;
    let local_port = pick_ephemeral_port()?;
    let local = openssh::Socket::TcpSocket(std::net::SocketAddr::from((
        std::net::Ipv4Addr::LOCALHOST,
        local_port,
    )));
    let remote = openssh::Socket::TcpSocket(std::net::SocketAddr::from((
        std::net::Ipv4Addr::LOCALHOST,
        EXEC_LISTEN_PORT,
    )));
    session
        .request_port_forward(openssh::ForwardType::Local, local, remote)
        .await
        .context("failed to establish local port forward")?;
    tracing::debug!(local_port, "local port forward established");
    Ok((session, local_port))
}
