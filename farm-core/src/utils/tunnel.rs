//! TCP establishment through an optional upstream proxy.
//!
//! Supports direct connections, HTTP CONNECT tunnels, SOCKS5 (RFC 1928,
//! with RFC 1929 username/password auth), and SOCKS4/4a. The returned stream
//! is a plain `TcpStream` ready for a TLS or WebSocket handshake on top.

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use anyhow::{bail, Context, Result};
use base64::Engine;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

const SOCKS4_VERSION: u8 = 0x04;
const SOCKS4_REPLY_GRANTED: u8 = 0x5A;
const SOCKS5_VERSION: u8 = 0x05;
const METHOD_NO_AUTH: u8 = 0x00;
const METHOD_USER_PASS: u8 = 0x02;
const METHOD_NO_ACCEPTABLE: u8 = 0xFF;
const CMD_CONNECT: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const REPLY_SUCCEEDED: u8 = 0x00;

/// Open a TCP connection to `host:port`, tunneling through `proxy` when set.
pub async fn dial(proxy: Option<&ProxyConfig>, host: &str, port: u16) -> Result<TcpStream> {
    let proxy = match proxy {
        None => {
            let stream = TcpStream::connect((host, port))
                .await
                .with_context(|| format!("Direct connect to {}:{} failed", host, port))?;
            return Ok(stream);
        }
        Some(p) => p,
    };

    let (scheme, authority) = proxy
        .url
        .split_once("://")
        .unwrap_or(("http", proxy.url.as_str()));

    debug!("Dialing {}:{} via {} proxy {}", host, port, scheme, proxy.masked());

    let stream = TcpStream::connect(authority).await.map_err(|e| {
        ProxyError::TunnelFailed {
            proxy: proxy.masked(),
            target: format!("{}:{}", host, port),
            reason: e.to_string(),
        }
    })?;

    match scheme {
        "http" | "https" => http_connect(stream, proxy, host, port).await,
        "socks5" => socks5_connect(stream, proxy, host, port).await,
        "socks4" => socks4_connect(stream, proxy, host, port).await,
        other => bail!("Unsupported proxy scheme: {}", other),
    }
}

async fn http_connect(
    mut stream: TcpStream,
    proxy: &ProxyConfig,
    host: &str,
    port: u16,
) -> Result<TcpStream> {
    let mut request = format!(
        "CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\nProxy-Connection: keep-alive\r\n"
    );
    if let (Some(user), Some(pass)) = (&proxy.username, &proxy.password) {
        let credentials =
            base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", user, pass));
        request.push_str(&format!("Proxy-Authorization: Basic {}\r\n", credentials));
    }
    request.push_str("\r\n");

    stream.write_all(request.as_bytes()).await?;

    // Read the response head only; the tunnel payload follows the blank line.
    let mut response = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    while !response.ends_with(b"\r\n\r\n") {
        if response.len() > 4096 {
            bail!("Oversized CONNECT response from proxy");
        }
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            bail!("Proxy closed connection during CONNECT");
        }
        response.push(byte[0]);
    }

    let head = String::from_utf8_lossy(&response);
    let status_line = head.lines().next().unwrap_or_default();
    if !status_line.contains(" 200") {
        return Err(ProxyError::TunnelFailed {
            proxy: proxy.masked(),
            target: format!("{}:{}", host, port),
            reason: format!("CONNECT rejected: {}", status_line),
        }
        .into());
    }

    Ok(stream)
}

async fn socks4_connect(
    mut stream: TcpStream,
    proxy: &ProxyConfig,
    host: &str,
    port: u16,
) -> Result<TcpStream> {
    if host.len() > 255 {
        bail!("Hostname too long for SOCKS4 request");
    }

    let mut request = vec![SOCKS4_VERSION, CMD_CONNECT];
    request.extend_from_slice(&port.to_be_bytes());

    // IPv4 literals go in the destination field; anything else uses the
    // SOCKS4a marker address 0.0.0.1 with the hostname appended.
    let literal = host.parse::<std::net::Ipv4Addr>().ok();
    match literal {
        Some(ip) => request.extend_from_slice(&ip.octets()),
        None => request.extend_from_slice(&[0, 0, 0, 1]),
    }
    if let Some(user) = &proxy.username {
        request.extend_from_slice(user.as_bytes());
    }
    request.push(0x00);
    if literal.is_none() {
        request.extend_from_slice(host.as_bytes());
        request.push(0x00);
    }
    stream.write_all(&request).await?;

    let mut reply = [0u8; 8];
    stream.read_exact(&mut reply).await?;
    if reply[1] != SOCKS4_REPLY_GRANTED {
        return Err(ProxyError::TunnelFailed {
            proxy: proxy.masked(),
            target: format!("{}:{}", host, port),
            reason: format!("SOCKS4 reply code {:#04x}", reply[1]),
        }
        .into());
    }

    Ok(stream)
}

async fn socks5_connect(
    mut stream: TcpStream,
    proxy: &ProxyConfig,
    host: &str,
    port: u16,
) -> Result<TcpStream> {
    let has_auth = proxy.username.is_some() && proxy.password.is_some();

    // Method negotiation.
    if has_auth {
        stream
            .write_all(&[SOCKS5_VERSION, 2, METHOD_NO_AUTH, METHOD_USER_PASS])
            .await?;
    } else {
        stream.write_all(&[SOCKS5_VERSION, 1, METHOD_NO_AUTH]).await?;
    }

    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await?;
    if choice[0] != SOCKS5_VERSION || choice[1] == METHOD_NO_ACCEPTABLE {
        bail!("SOCKS5 method negotiation failed");
    }

    if choice[1] == METHOD_USER_PASS {
        let (user, pass) = match (&proxy.username, &proxy.password) {
            (Some(u), Some(p)) => (u.as_bytes(), p.as_bytes()),
            _ => bail!("SOCKS5 proxy requires credentials"),
        };
        if user.len() > 255 || pass.len() > 255 {
            bail!("SOCKS5 credentials too long");
        }
        let mut auth = vec![0x01, user.len() as u8];
        auth.extend_from_slice(user);
        auth.push(pass.len() as u8);
        auth.extend_from_slice(pass);
        stream.write_all(&auth).await?;

        let mut reply = [0u8; 2];
        stream.read_exact(&mut reply).await?;
        if reply[1] != 0x00 {
            bail!("SOCKS5 authentication rejected");
        }
    }

    // CONNECT request with domain address type.
    if host.len() > 255 {
        bail!("Hostname too long for SOCKS5 request");
    }
    let mut request = vec![SOCKS5_VERSION, CMD_CONNECT, 0x00, ATYP_DOMAIN, host.len() as u8];
    request.extend_from_slice(host.as_bytes());
    request.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&request).await?;

    let mut reply_head = [0u8; 4];
    stream.read_exact(&mut reply_head).await?;
    if reply_head[1] != REPLY_SUCCEEDED {
        return Err(ProxyError::TunnelFailed {
            proxy: proxy.masked(),
            target: format!("{}:{}", host, port),
            reason: format!("SOCKS5 reply code {:#04x}", reply_head[1]),
        }
        .into());
    }

    // Drain the bound address in the reply.
    let addr_len = match reply_head[3] {
        0x01 => 4,
        0x03 => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            len[0] as usize
        }
        0x04 => 16,
        other => bail!("SOCKS5 reply with unknown address type {:#04x}", other),
    };
    let mut rest = vec![0u8; addr_len + 2];
    stream.read_exact(&mut rest).await?;

    Ok(stream)
}
