// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

use std::str::FromStr;

use snafu::location;

use crate::{Error, Result};

/// Parse a string into a boolean value.
pub fn str_is_truthy(val: &str) -> bool {
    val.eq_ignore_ascii_case("1")
        | val.eq_ignore_ascii_case("true")
        | val.eq_ignore_ascii_case("on")
        | val.eq_ignore_ascii_case("yes")
        | val.eq_ignore_ascii_case("y")
}

/// Whether a string spells a false boolean value.
pub fn str_is_falsy(val: &str) -> bool {
    val.eq_ignore_ascii_case("0")
        | val.eq_ignore_ascii_case("false")
        | val.eq_ignore_ascii_case("off")
        | val.eq_ignore_ascii_case("no")
        | val.eq_ignore_ascii_case("n")
}

/// Parse the boolean option `key`. Values that are neither truthy nor falsy
/// are rejected.
pub fn parse_bool_option(key: &str, val: &str) -> Result<bool> {
    let val = val.trim();
    if str_is_truthy(val) {
        Ok(true)
    } else if str_is_falsy(val) {
        Ok(false)
    } else {
        Err(Error::invalid_input(
            format!("option '{key}' has invalid value '{val}': expected a boolean"),
            location!(),
        ))
    }
}

/// Parse the value of the option `key`, reporting a readable error.
pub fn parse_option<T: FromStr>(key: &str, val: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    val.trim().parse::<T>().map_err(|e| {
        Error::invalid_input(
            format!("option '{key}' has invalid value '{val}': {e}"),
            location!(),
        )
    })
}

/// Read a numeric tuning knob from the environment, if set.
pub fn env_option<T: FromStr>(var: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(val) => parse_option(var, &val).map(Some),
        Err(_) => Ok(None),
    }
}
