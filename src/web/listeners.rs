use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;

/// Binds the server listener. A host of `*` means "all interfaces": an
/// IPv6+IPv4 dual-stack socket when the system supports it, plain IPv4
/// otherwise.
pub async fn create_listener(
    host: &str,
    port: u16,
) -> std::io::Result<(String, tokio::net::TcpListener)> {
    if host == "*" {
        return create_wildcard_listener(port);
    }

    let addr = format!("{}:{}", host, port);
    tracing::info!("Attempting to bind server to {}...", addr);

    let tokio_listener = tokio::net::TcpListener::bind(&addr).await?;

    Ok((addr, tokio_listener))
}

fn create_wildcard_listener(port: u16) -> std::io::Result<(String, tokio::net::TcpListener)> {
    match create_dual_stack_listener(port) {
        Ok(bound) => Ok(bound),
        Err(e) => {
            tracing::warn!("Failed to bind IPv6 dual-stack listener ({}); trying IPv4 only", e);
            create_ipv4_wildcard_listener(port)
        }
    }
}

fn create_dual_stack_listener(port: u16) -> std::io::Result<(String, tokio::net::TcpListener)> {
    let str_addr = format!("[::]:{}", port);
    let addr: SocketAddr = str_addr
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    tracing::info!(
        "Attempting to bind server to {}... (IPv6 + IPv4 dual-stack)",
        str_addr
    );

    let socket = Socket::new(Domain::IPV6, Type::STREAM, Some(Protocol::TCP))?;
    // Dual-stack mode can fail on some systems; single-stack IPv6 still works.
    if let Err(e) = socket.set_only_v6(false) {
        tracing::warn!("Failed to enable dual-stack mode: {}. Continuing with IPv6 only.", e);
    }

    into_tokio_listener(socket, addr, str_addr)
}

fn create_ipv4_wildcard_listener(port: u16) -> std::io::Result<(String, tokio::net::TcpListener)> {
    let str_addr = format!("0.0.0.0:{}", port);
    let addr: SocketAddr = str_addr
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    tracing::info!("Attempting to bind server to {}... (IPv4)", str_addr);

    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    into_tokio_listener(socket, addr, str_addr)
}

fn into_tokio_listener(
    socket: Socket,
    addr: SocketAddr,
    str_addr: String,
) -> std::io::Result<(String, tokio::net::TcpListener)> {
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    // Tokio requires the socket in non-blocking mode.
    socket.set_nonblocking(true)?;

    let std_listener: std::net::TcpListener = socket.into();
    let tokio_listener = tokio::net::TcpListener::from_std(std_listener)?;

    Ok((str_addr, tokio_listener))
}
