//! Token codec for collapse-state maps.
//!
//! Wire form: `<payload>.<tag>` where `payload` is the percent-encoded,
//! URL-safe, unpadded base64 of the JSON object `{NodeId: "collapsed", ...}`
//! (keys sorted) and `tag` is `s<checksum>-n<count>`.

use std::{fmt, str::FromStr};

use anyhow::{Context, Result};
use base64::{
    alphabet,
    engine::{
        general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE_NO_PAD},
        DecodePaddingMode,
    },
    Engine as _,
};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    state::{CollapseState, StateMap},
};

/// Characters left alone by the browser's `encodeURIComponent`
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Standard alphabet, padding optional, trailing bits tolerated (as `atob` does)
const LENIENT_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

const CHECKSUM_MODULUS: u64 = 1000;

/// How a decoder treats the trailing `s<checksum>-n<count>` tag
#[derive(Serialize, Deserialize, Default, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TagPolicy {
    /// The tag is an inert marker; the payload is always trusted
    #[default]
    Lenient,
    /// Tokens whose tag disagrees with the payload decode to `{}`.
    /// Untagged legacy tokens are still accepted.
    Strict,
}

impl FromStr for TagPolicy {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "lenient" => Ok(TagPolicy::Lenient),
            "strict" => Ok(TagPolicy::Strict),
            other => Err(Error::Config(format!("unknown tag policy: {}", other))),
        }
    }
}

/// The `s<checksum>-n<count>` fingerprint tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub checksum: u32,
    pub count: usize,
}

impl Tag {
    /// Compute the tag for a map, in key order.
    ///
    /// The fingerprint is the first 3 UTF-16 units of each id followed by the
    /// first unit of the state's wire name; the checksum is the sum of those
    /// units mod 1000.
    pub fn compute(map: &StateMap) -> Self {
        let checksum = map
            .iter()
            .flat_map(|(id, state)| {
                id.encode_utf16()
                    .take(3)
                    .chain(state.as_str().encode_utf16().take(1))
                    .collect::<Vec<u16>>()
            })
            .map(u64::from)
            .sum::<u64>()
            % CHECKSUM_MODULUS;

        Tag {
            checksum: checksum as u32,
            count: map.len(),
        }
    }

    /// Parse `s<checksum>-n<count>`
    pub fn parse(tag: &str) -> Result<Self> {
        let rest = tag
            .strip_prefix('s')
            .with_context(|| format!("Tag missing 's' prefix: {}", tag))?;
        let (checksum, count) = rest
            .split_once("-n")
            .with_context(|| format!("Tag missing '-n' separator: {}", tag))?;
        let checksum = checksum
            .parse::<u32>()
            .with_context(|| format!("Invalid checksum in tag: {}", tag))?;
        let count = count
            .parse::<usize>()
            .with_context(|| format!("Invalid count in tag: {}", tag))?;

        Ok(Tag { checksum, count })
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}-n{}", self.checksum, self.count)
    }
}

/// Outcome of comparing a token's declared tag with its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagStatus {
    /// Legacy/unsegmented token
    Missing,
    Match,
    Mismatch { declared: Tag, computed: Tag },
    Malformed,
}

/// Everything [`Codec::inspect`] learns about a token
#[derive(Debug, Clone)]
pub struct TokenReport {
    pub map: StateMap,
    pub declared_tag: Option<String>,
    pub computed_tag: Tag,
    pub status: TagStatus,
}

/// Encoder/decoder for state tokens
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec {
    policy: TagPolicy,
}

impl Codec {
    pub fn new(policy: TagPolicy) -> Self {
        Codec { policy }
    }

    pub fn policy(&self) -> TagPolicy {
        self.policy
    }

    /// Encode the collapsed entries of `map`. A fully expanded map encodes to
    /// the empty string.
    pub fn encode(&self, map: &StateMap) -> String {
        let sparse = map.sparse();
        if sparse.is_empty() {
            return String::new();
        }

        let tag = Tag::compute(&sparse);
        // A BTreeMap<String, enum> always serializes
        let json = serde_json::to_string(&sparse).unwrap_or_default();
        let payload = URL_SAFE_NO_PAD.encode(json.as_bytes());

        format!(
            "{}.{}",
            utf8_percent_encode(&payload, URI_COMPONENT),
            tag
        )
    }

    /// Decode a token. Never fails: any malformed input yields `{}`.
    pub fn decode(&self, token: &str) -> StateMap {
        if token.trim().is_empty() {
            return StateMap::new();
        }

        let (payload, tag) = split_token(token);
        let map = match decode_payload(payload) {
            Ok(map) => map,
            Err(segmented_err) => match decode_payload(token) {
                Ok(map) => {
                    tracing::debug!("Decoded legacy unsegmented token");
                    return map;
                }
                Err(_) => {
                    tracing::debug!("Discarding undecodable token: {:#}", segmented_err);
                    return StateMap::new();
                }
            },
        };

        if self.policy == TagPolicy::Strict {
            match tag_status(&map, tag) {
                TagStatus::Missing | TagStatus::Match => {}
                status => {
                    tracing::warn!("Rejecting token with bad tag: {:?}", status);
                    return StateMap::new();
                }
            }
        }

        map
    }

    /// Decode a token and report how its tag relates to its payload
    pub fn inspect(&self, token: &str) -> TokenReport {
        let (_, tag) = split_token(token);
        // Inspection always looks at the payload, whatever the policy
        let map = Codec::new(TagPolicy::Lenient).decode(token);

        TokenReport {
            computed_tag: Tag::compute(&map),
            status: tag_status(&map, tag),
            declared_tag: tag.map(str::to_string),
            map,
        }
    }
}

/// Encode with the default (lenient) codec
pub fn encode(map: &StateMap) -> String {
    Codec::default().encode(map)
}

/// Decode with the default (lenient) codec
pub fn decode(token: &str) -> StateMap {
    Codec::default().decode(token)
}

/// Split on the first `.`
fn split_token(token: &str) -> (&str, Option<&str>) {
    match token.split_once('.') {
        Some((payload, tag)) => (payload, Some(tag)),
        None => (token, None),
    }
}

fn tag_status(map: &StateMap, tag: Option<&str>) -> TagStatus {
    let Some(tag) = tag else {
        return TagStatus::Missing;
    };
    let Ok(declared) = Tag::parse(tag) else {
        return TagStatus::Malformed;
    };
    let computed = Tag::compute(map);
    if declared == computed {
        TagStatus::Match
    } else {
        TagStatus::Mismatch { declared, computed }
    }
}

/// percent-decode -> un-substitute -> base64 -> JSON object
fn decode_payload(segment: &str) -> std::result::Result<StateMap, Error> {
    let unescaped = percent_decode_str(segment)
        .decode_utf8()
        .map_err(|e| Error::Decode(format!("invalid percent-encoding: {}", e)))?;
    let standard = unescaped.replace('-', "+").replace('_', "/");
    let bytes = LENIENT_STANDARD
        .decode(standard.as_bytes())
        .map_err(|e| Error::Decode(format!("invalid base64: {}", e)))?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)?;

    let serde_json::Value::Object(object) = value else {
        return Err(Error::Decode("payload is not a JSON object".to_string()));
    };

    Ok(object
        .into_iter()
        .filter_map(|(id, state)| {
            let parsed = state.as_str().and_then(CollapseState::parse);
            if parsed.is_none() {
                tracing::debug!("Ignoring entry {} with unknown state {}", id, state);
            }
            parsed.map(|state| (id, state))
        })
        .collect())
}
