//! Interactive credential prompt used when a cluster has no API key.

use std::io::{self, BufRead, Write};
use sw_core::{CredentialSource, Credentials, SecureString};

/// Asks on the terminal. The username is echoed, the password is not.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl CredentialSource for TerminalPrompt {
    fn credentials_for(&self, address: &str) -> io::Result<Credentials> {
        let mut stdout = io::stdout();
        write!(stdout, "Username for {}: ", address)?;
        stdout.flush()?;

        let username = read_username(&mut io::stdin().lock())?;
        let password = rpassword::prompt_password(format!("Password for {}@{}: ", username, address))?;

        Ok(Credentials {
            username,
            password: SecureString::new(password),
        })
    }
}

fn read_username(input: &mut impl BufRead) -> io::Result<String> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "no username entered",
        ));
    }
    let username = line.trim();
    if username.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "username must not be empty",
        ));
    }
    Ok(username.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_username_trims() {
        let mut input = io::Cursor::new("admin\r\n");
        assert_eq!(read_username(&mut input).unwrap(), "admin");
    }

    #[test]
    fn test_read_username_rejects_empty() {
        let mut input = io::Cursor::new("  \n");
        let err = read_username(&mut input).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let mut input = io::Cursor::new("");
        let err = read_username(&mut input).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
