use std::{
    fs::File,
    io::{self, Error, ErrorKind},
    net::TcpStream,
    path::Path,
};

use ssh2::Session;

/// Copies local files to the remote host over a single
/// password-authenticated SSH session. `uploads` holds
/// (local path, absolute remote path) pairs. Any failure aborts the
/// whole batch; files already copied are left in place.
pub fn upload_files(
    host: &str,
    user: &str,
    password: &str,
    uploads: &[(String, String)],
) -> io::Result<()> {
    log::info!("opening scp session to {}@{}", user, host);
    let tcp = TcpStream::connect(format!("{}:22", host))?;

    let mut session = Session::new().map_err(|e| {
        Error::new(ErrorKind::Other, format!("failed to create session {}", e))
    })?;
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|e| Error::new(ErrorKind::Other, format!("ssh handshake failed {}", e)))?;
    session.userauth_password(user, password).map_err(|e| {
        Error::new(
            ErrorKind::PermissionDenied,
            format!("password auth failed for '{}' {}", user, e),
        )
    })?;

    for (local, remote) in uploads.iter() {
        log::info!("uploading '{}' to '{}'", local, remote);
        let mut f = File::open(local)?;
        let size = f.metadata()?.len();

        let mut channel = session
            .scp_send(Path::new(remote), 0o644, size, None)
            .map_err(|e| {
                Error::new(
                    ErrorKind::Other,
                    format!("failed scp_send '{}' {}", remote, e),
                )
            })?;
        io::copy(&mut f, &mut channel)?;
        channel.send_eof()?;
        channel.wait_eof()?;
        channel.close()?;
        channel.wait_close()?;
    }

    log::info!("uploaded {} files", uploads.len());
    Ok(())
}
