//! # Serial Link
//!
//! Talks to the scale over an RS-232 / USB-serial tty (or one end of a
//! virtual COM-port pair when the emulator stands in for the scale).
//!
//! ## TTY Configuration
//!
//! The device is opened non-blocking and put in raw mode so binary frames
//! pass through untouched:
//!
//! - **No input processing**: IGNBRK, BRKINT, PARMRK, ISTRIP, INLCR, IGNCR,
//!   ICRNL, IXON, IXOFF, IXANY all cleared
//! - **No output processing**: OPOST cleared
//! - **Non-canonical, no echo**: ECHO, ECHONL, ICANON, ISIG, IEXTEN cleared
//! - **8N1**: CS8, no PARENB, no CSTOPB, no CRTSCTS; CLOCAL and CREAD set
//!
//! XON/XOFF must be off: 0x11 and 0x13 appear in PLU ids and logo bitmaps.
//!
//! Timeouts come from `poll(2)`, so VMIN and VTIME are both zero.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::Link;
use crate::config::LinkConfig;
use crate::error::{Result, ScaleError};

pub struct SerialLink {
    file: Option<File>,
    path: String,
    write_timeout: Duration,
}

impl SerialLink {
    /// Open and configure the tty named by `config.channel`.
    ///
    /// ## Errors
    ///
    /// - the device does not exist or permission is denied (dialout group)
    /// - the baud rate is not one of [`SUPPORTED_BAUDS`](crate::config::SUPPORTED_BAUDS)
    /// - termios configuration fails
    pub fn open(config: &LinkConfig) -> Result<Self> {
        config.validate()?;
        let path = config.channel.as_str();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(path)
            .map_err(|e| ScaleError::Transport(format!("Failed to open {}: {}", path, e)))?;

        configure_tty(file.as_raw_fd(), config.baud)?;
        flush_input(file.as_raw_fd())?;

        info!(channel = %path, baud = config.baud, "serial link open");
        Ok(Self {
            file: Some(file),
            path: path.to_string(),
            write_timeout: config.write_timeout(),
        })
    }

    fn file(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or(ScaleError::TransportClosed)
    }
}

impl Link for SerialLink {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        let deadline = Instant::now() + self.write_timeout;
        let file = self.file()?;
        let mut written = 0;
        while written < data.len() {
            let left = deadline.saturating_duration_since(Instant::now());
            wait_for(file.as_raw_fd(), libc::POLLOUT, left)?;
            match file.write(&data[written..]) {
                Ok(0) => return Err(ScaleError::TransportClosed),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        file.flush()?;
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let file = self.file()?;
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            wait_for(file.as_raw_fd(), libc::POLLIN, left)?;
            match file.read(buf) {
                // Readable with nothing to read: the line hung up.
                Ok(0) => return Err(ScaleError::TransportClosed),
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.file.take().is_some() {
            debug!(channel = %self.path, "serial link closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn clear_input(&mut self) -> Result<()> {
        let fd = self.file()?.as_raw_fd();
        flush_input(fd)
    }
}

/// Block until `fd` is ready for `events` or `timeout` passes.
fn wait_for(fd: i32, events: libc::c_short, timeout: Duration) -> Result<()> {
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    let ms = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
    loop {
        let rc = unsafe { libc::poll(&mut pfd, 1, ms) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err.into());
        }
        if rc == 0 {
            return Err(ScaleError::Unresponsive);
        }
        if pfd.revents & (libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) != 0
            && pfd.revents & events == 0
        {
            return Err(ScaleError::TransportClosed);
        }
        return Ok(());
    }
}

fn flush_input(fd: i32) -> Result<()> {
    let rc = unsafe { libc::tcflush(fd, libc::TCIFLUSH) };
    if rc != 0 {
        return Err(ScaleError::Transport(format!(
            "tcflush failed: {}",
            io::Error::last_os_error()
        )));
    }
    Ok(())
}

fn baud_constant(baud: u32) -> Result<libc::speed_t> {
    Ok(match baud {
        1200 => libc::B1200,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115200 => libc::B115200,
        other => {
            return Err(ScaleError::Config(format!(
                "unsupported baud rate {}",
                other
            )));
        }
    })
}

/// Put `fd` in raw 8N1 mode at `baud`.
fn configure_tty(fd: i32, baud: u32) -> Result<()> {
    use std::mem::MaybeUninit;

    let speed = baud_constant(baud)?;

    let mut termios = MaybeUninit::uninit();
    let result = unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) };
    if result != 0 {
        return Err(ScaleError::Transport(format!(
            "tcgetattr failed: {}",
            io::Error::last_os_error()
        )));
    }
    let mut termios = unsafe { termios.assume_init() };

    termios.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IXON
        | libc::IXOFF
        | libc::IXANY);

    termios.c_oflag &= !libc::OPOST;

    termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);

    termios.c_cflag &= !(libc::CSIZE | libc::PARENB | libc::CSTOPB | libc::CRTSCTS);
    termios.c_cflag |= libc::CS8 | libc::CLOCAL | libc::CREAD;

    termios.c_cc[libc::VMIN] = 0;
    termios.c_cc[libc::VTIME] = 0;

    let rc = unsafe {
        libc::cfsetispeed(&mut termios, speed) | libc::cfsetospeed(&mut termios, speed)
    };
    if rc != 0 {
        return Err(ScaleError::Transport(format!(
            "cannot set baud rate {}: {}",
            baud,
            io::Error::last_os_error()
        )));
    }

    let result = unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) };
    if result != 0 {
        return Err(ScaleError::Transport(format!(
            "tcsetattr failed: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baud_constants() {
        assert_eq!(baud_constant(9600).unwrap(), libc::B9600);
        assert_eq!(baud_constant(115200).unwrap(), libc::B115200);
        assert!(baud_constant(9601).is_err());
    }

    #[test]
    fn test_open_missing_device() {
        let config = LinkConfig {
            channel: "/dev/this-scale-does-not-exist".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            SerialLink::open(&config),
            Err(ScaleError::Transport(_))
        ));
    }

    #[test]
    fn test_open_rejects_bad_baud() {
        let config = LinkConfig {
            baud: 1234,
            ..Default::default()
        };
        assert!(matches!(
            SerialLink::open(&config),
            Err(ScaleError::Config(_))
        ));
    }
}
