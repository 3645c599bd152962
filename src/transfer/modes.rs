//! FTP transfer modes
//!
//! Address codecs for active (PORT/EPRT) and passive (PASV/EPSV) mode.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::error::TransferError;

/// Parses a PORT argument `h1,h2,h3,h4,p1,p2`.
pub fn parse_port(param: &str) -> Result<SocketAddr, TransferError> {
    let invalid = || TransferError::InvalidPortCommand(param.to_string());

    let fields = param
        .split(',')
        .map(|f| f.trim().parse::<u8>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| invalid())?;
    let [h1, h2, h3, h4, p1, p2] = fields[..] else {
        return Err(invalid());
    };

    let ip = Ipv4Addr::new(h1, h2, h3, h4);
    let port = u16::from(p1) * 256 + u16::from(p2);
    Ok(SocketAddr::new(IpAddr::V4(ip), port))
}

/// Parses an EPRT argument `<d><af><d><host><d><port><d>`. The delimiter is
/// whatever character the client opens with. Address families other than
/// 1 (IPv4) and 2 (IPv6) are rejected with
/// [`TransferError::UnsupportedAddressFamily`].
pub fn parse_eprt(param: &str) -> Result<SocketAddr, TransferError> {
    let invalid = || TransferError::InvalidPortCommand(param.to_string());

    let delimiter = param.chars().next().ok_or_else(invalid)?;
    let fields: Vec<&str> = param.split(delimiter).collect();
    // leading and trailing delimiters produce empty outer fields
    let ["", af, host, port, ""] = fields[..] else {
        return Err(invalid());
    };

    if af != "1" && af != "2" {
        return Err(TransferError::UnsupportedAddressFamily(af.to_string()));
    }

    let ip: IpAddr = host.parse().map_err(|_| invalid())?;
    match (af, ip) {
        ("1", IpAddr::V4(_)) | ("2", IpAddr::V6(_)) => {}
        _ => return Err(invalid()),
    }
    let port: u16 = port.parse().map_err(|_| invalid())?;
    Ok(SocketAddr::new(ip, port))
}

/// Formats the `227` reply for a passive listener. Only IPv4 (or
/// IPv4-mapped) addresses can be expressed.
pub fn pasv_reply(addr: SocketAddr) -> Option<String> {
    let ip = match addr.ip().to_canonical() {
        IpAddr::V4(ip) => ip,
        IpAddr::V6(_) => return None,
    };
    let [h1, h2, h3, h4] = ip.octets();
    let port = addr.port();
    Some(format!(
        "227 Entering Passive Mode ({},{},{},{},{},{})",
        h1,
        h2,
        h3,
        h4,
        port >> 8,
        port & 0xff
    ))
}

pub fn epsv_reply(addr: SocketAddr) -> String {
    format!("229 Entering Extended Passive Mode (|||{}|)", addr.port())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port() {
        let addr = parse_port("127,0,0,1,19,136").unwrap();
        assert_eq!(addr, "127.0.0.1:5000".parse().unwrap());
    }

    #[test]
    fn test_parse_port_rejects_malformed() {
        assert!(parse_port("127,0,0,1,19").is_err());
        assert!(parse_port("127,0,0,1,19,136,1").is_err());
        assert!(parse_port("256,0,0,1,19,136").is_err());
        assert!(parse_port("a,b,c,d,e,f").is_err());
    }

    #[test]
    fn test_parse_eprt_ipv4() {
        let addr = parse_eprt("|1|127.0.0.1|5000|").unwrap();
        assert_eq!(addr, "127.0.0.1:5000".parse().unwrap());
    }

    #[test]
    fn test_parse_eprt_ipv6_with_custom_delimiter() {
        let addr = parse_eprt("!2!::1!6000!").unwrap();
        assert_eq!(addr, "[::1]:6000".parse().unwrap());
    }

    #[test]
    fn test_parse_eprt_unknown_family() {
        assert!(matches!(
            parse_eprt("|3|127.0.0.1|5000|"),
            Err(TransferError::UnsupportedAddressFamily(af)) if af == "3"
        ));
    }

    #[test]
    fn test_parse_eprt_family_mismatch() {
        assert!(matches!(
            parse_eprt("|2|127.0.0.1|5000|"),
            Err(TransferError::InvalidPortCommand(_))
        ));
    }

    #[test]
    fn test_pasv_reply() {
        let reply = pasv_reply("10.0.0.5:5000".parse().unwrap()).unwrap();
        assert_eq!(reply, "227 Entering Passive Mode (10,0,0,5,19,136)");
        assert!(pasv_reply("[2001:db8::1]:21".parse().unwrap()).is_none());
    }

    #[test]
    fn test_epsv_reply() {
        let reply = epsv_reply("[::1]:40000".parse().unwrap());
        assert_eq!(reply, "229 Entering Extended Passive Mode (|||40000|)");
    }
}
