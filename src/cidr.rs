use std::fmt::{self, Display, Formatter};
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::VpcApiError;

/// An IPv4 network block. Host bits given on input are cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    pub fn new(address: Ipv4Addr, prefix: u8) -> Result<Self, VpcApiError> {
        if prefix > 32 {
            return Err(VpcApiError::Validation(format!(
                "Invalid prefix length /{}",
                prefix
            )));
        }
        let network = Ipv4Addr::from(u32::from(address) & Self::mask(prefix));
        Ok(Ipv4Cidr { network, prefix })
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Splits the block into consecutive blocks of `new_prefix`, in address order.
    pub fn subnets(&self, new_prefix: u8) -> impl Iterator<Item = Ipv4Cidr> {
        let base = u32::from(self.network);
        let valid = new_prefix >= self.prefix && new_prefix <= 32;
        let count: u64 = if valid {
            1u64 << (new_prefix - self.prefix)
        } else {
            0
        };
        let step: u64 = if valid { 1u64 << (32 - new_prefix) } else { 0 };
        (0..count).map(move |index| Ipv4Cidr {
            network: Ipv4Addr::from((u64::from(base) + index * step) as u32),
            prefix: new_prefix,
        })
    }

    fn mask(prefix: u8) -> u32 {
        match prefix {
            0 => 0,
            p => u32::MAX << (32 - u32::from(p)),
        }
    }
}

impl FromStr for Ipv4Cidr {
    type Err = VpcApiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || VpcApiError::Validation(format!("Invalid CIDR block {}", value));
        let (address, prefix) = value.trim().split_once('/').ok_or_else(invalid)?;
        let address = address.parse::<Ipv4Addr>().map_err(|_| invalid())?;
        let prefix = prefix.parse::<u8>().map_err(|_| invalid())?;
        if prefix > 32 {
            return Err(invalid());
        }
        Ipv4Cidr::new(address, prefix)
    }
}

impl Display for Ipv4Cidr {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

/// Carves `count` equally sized subnets out of `vpc_cidr`, using the
/// smallest prefix extension that fits them all.
pub fn calculate_subnets(vpc_cidr: &Ipv4Cidr, count: u32) -> Result<Vec<Ipv4Cidr>, VpcApiError> {
    let mut prefix = vpc_cidr.prefix();
    let mut available: u64 = 1;
    while available < u64::from(count) && prefix < 32 {
        prefix += 1;
        available = 1u64 << (prefix - vpc_cidr.prefix());
    }

    if available < u64::from(count) {
        return Err(VpcApiError::Validation(format!(
            "Cannot create {} subnets from {}",
            count, vpc_cidr
        )));
    }

    let subnets: Vec<Ipv4Cidr> = vpc_cidr.subnets(prefix).take(count as usize).collect();
    tracing::info!(
        "Calculated {} subnets (/{}) from {}",
        subnets.len(),
        prefix,
        vpc_cidr
    );
    Ok(subnets)
}
