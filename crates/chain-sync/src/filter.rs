//! Resolves a `configs::LogFilterConfig` (TOML-facing: paths, literals,
//! human-readable hex strings) into `event_store::model::ResolvedFilter`
//! (the narrow shape the store's predicate builder understands). ABI
//! *parsing* stays out of scope (§1); only the address/topic predicate is
//! resolved here.

use {
    crate::{conversion, error::ConversionError, hex_codec},
    configs::{filter::OneOrMany, LogFilterConfig},
    event_store::model::{ResolvedFilter, TopicSlot},
};

fn resolve_addresses(
    address: &Option<OneOrMany<String>>,
) -> Result<Option<Vec<event_store::model::Address>>, ConversionError> {
    let Some(address) = address else {
        return Ok(None);
    };
    let values = match address {
        OneOrMany::One(value) => vec![value.clone()],
        OneOrMany::Many(values) => values.clone(),
    };
    Ok(Some(
        values
            .iter()
            .map(|value| hex_codec::parse_exact(value))
            .collect::<Result<_, _>>()?,
    ))
}

fn resolve_topic_slot(slot: &configs::filter::TopicSlot) -> Result<TopicSlot, ConversionError> {
    match slot {
        None => Ok(TopicSlot::Any),
        Some(OneOrMany::One(value)) => Ok(TopicSlot::One(hex_codec::parse_exact(value)?)),
        Some(OneOrMany::Many(values)) => Ok(TopicSlot::Set(
            values
                .iter()
                .map(|value| hex_codec::parse_exact(value))
                .collect::<Result<_, _>>()?,
        )),
    }
}

pub fn resolve(config: &LogFilterConfig) -> Result<ResolvedFilter, ConversionError> {
    let topics = config
        .topics
        .as_ref()
        .map(|slots| slots.iter().map(resolve_topic_slot).collect::<Result<Vec<_>, _>>())
        .transpose()?
        .unwrap_or_default();

    Ok(ResolvedFilter {
        name: config.name.clone(),
        chain_id: conversion::chain_id_to_i64(config.chain_id)?,
        address: resolve_addresses(&config.address)?,
        topics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> LogFilterConfig {
        let address = format!("0x{}", "11".repeat(20));
        toml::from_str(&format!(
            r#"
            name = "transfers"
            network = "mainnet"
            chain-id = 1
            abi = "abi/erc20.json"
            address = "{address}"
            "#
        ))
        .unwrap()
    }

    #[test]
    fn resolves_single_address() {
        let resolved = resolve(&base_config()).unwrap();
        assert_eq!(resolved.address.unwrap().len(), 1);
    }

    #[test]
    fn absent_topics_resolve_to_empty_slots() {
        let resolved = resolve(&base_config()).unwrap();
        assert!(resolved.topics.is_empty());
    }
}
