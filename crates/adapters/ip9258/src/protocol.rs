//! The strip's `set.cmd` command language.
//!
//! Both `getpower` and `setpower` answer with the state of every outlet as
//! `p6<outlet>=<0|1>` pairs embedded in a small HTML page.

use crate::error::Ip9258Error;

/// Outlet numbers of the strip.
pub const OUTLETS: [u8; 4] = [1, 2, 3, 4];

pub const GET_POWER: &str = "getpower";

#[must_use]
pub fn outlet_name(outlet: u8) -> String {
    format!("AC Outlet {outlet}")
}

/// Command switching one outlet. The `+` is sent verbatim.
#[must_use]
pub fn set_power(outlet: u8, on: bool) -> String {
    format!("setpower+p6{outlet}={}", u8::from(on))
}

/// Outlet states found in `body`, in order of appearance.
///
/// # Errors
///
/// Returns [`Ip9258Error::Parse`] when no outlet state is present.
pub fn parse_power(body: &str) -> Result<Vec<(u8, bool)>, Ip9258Error> {
    let states: Vec<_> = body
        .match_indices("p6")
        .filter_map(|(at, _)| match body.as_bytes().get(at + 2..at + 5)? {
            [outlet @ b'1'..=b'4', b'=', state @ (b'0' | b'1')] => {
                Some((outlet - b'0', *state == b'1'))
            }
            _ => None,
        })
        .collect();
    if states.is_empty() {
        return Err(Ip9258Error::Parse(body.trim().to_string()));
    }
    Ok(states)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_read_outlets_from_html_answer() {
        let body = "<html>p61=1,p62=0,p63=0,p64=1</html>\r\n";
        assert_eq!(
            parse_power(body).unwrap(),
            [(1, true), (2, false), (3, false), (4, true)]
        );
    }

    #[test]
    fn should_skip_pairs_outside_outlet_range() {
        let body = "p65=1 p60=0 p62=1 p63=7";
        assert_eq!(parse_power(body).unwrap(), [(2, true)]);
    }

    #[test]
    fn should_reject_answer_without_outlets() {
        assert!(matches!(parse_power("<html></html>"), Err(Ip9258Error::Parse(_))));
        assert!(matches!(parse_power("p6"), Err(Ip9258Error::Parse(_))));
    }

    #[test]
    fn should_format_set_power_command() {
        assert_eq!(set_power(3, true), "setpower+p63=1");
        assert_eq!(set_power(1, false), "setpower+p61=0");
    }
}
