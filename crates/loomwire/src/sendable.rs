//! # Channel Boundary Check
//!
//! Validates a value against a transfer list before it may cross a port.
//! This is the observable surface of the deep-copy-with-transfer boundary:
//! plain data always passes, a contained port passes only when its token is
//! listed for transfer, and a listed token must actually occur in the value.
//!
//! Values move through channels by ownership transfer, so "copy" here is the
//! move itself; the check only decides whether the move is legal.

use std::fmt;

use crate::port::PortToken;
use crate::value::Value;

#[derive(Debug, Clone)]
pub enum Error {
    /// A port is embedded in the value but missing from the transfer list.
    PortNotListed(PortToken),
    /// A transfer-listed token does not occur anywhere in the value.
    TransferNotFound(PortToken),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PortNotListed(token) => {
                write!(f, "{} cannot be copied; list it for transfer", token)
            }
            Self::TransferNotFound(token) => {
                write!(f, "{} is listed for transfer but absent from the value", token)
            }
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Checks a single value against a transfer list, passing it through on
/// success.
pub fn into_sendable(value: Value, transfer: &[PortToken]) -> Result<Value> {
    let mut seen = Vec::new();
    walk(&value, transfer, &mut seen)?;
    check_all_seen(transfer, &seen)?;
    Ok(value)
}

/// Checks an argument list against a transfer list collectively: a listed
/// token may occur in any argument.
pub fn into_sendable_args(args: Vec<Value>, transfer: &[PortToken]) -> Result<Vec<Value>> {
    let mut seen = Vec::new();
    for arg in &args {
        walk(arg, transfer, &mut seen)?;
    }
    check_all_seen(transfer, &seen)?;
    Ok(args)
}

fn check_all_seen(transfer: &[PortToken], seen: &[PortToken]) -> Result<()> {
    for token in transfer {
        if !seen.contains(token) {
            return Err(Error::TransferNotFound(*token));
        }
    }
    Ok(())
}

fn walk(value: &Value, transfer: &[PortToken], seen: &mut Vec<PortToken>) -> Result<()> {
    match value {
        Value::Unit
        | Value::Bool(_)
        | Value::Int(_)
        | Value::Float(_)
        | Value::Text(_)
        | Value::Bytes(_) => Ok(()),
        Value::List(items) => {
            items.iter().try_for_each(|item| walk(item, transfer, seen))
        }
        Value::Map(entries) => {
            entries.values().try_for_each(|entry| walk(entry, transfer, seen))
        }
        Value::Port(port) => {
            let token = port.token();
            if !transfer.contains(&token) {
                return Err(Error::PortNotListed(token));
            }
            seen.push(token);
            Ok(())
        }
    }
}
