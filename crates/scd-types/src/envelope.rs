use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::identity::{BusinessKey, SurrogateKey};
use crate::temporal::Timestamp;
use crate::version::Version;

/// The five-field versioning envelope embedded in every entity.
///
/// A row is *latest* while `valid_to` is `None`. The only permitted mutation
/// of a persisted row is [`Envelope::close`], which sets `valid_to` once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub surrogate_key: SurrogateKey,
    pub business_key: BusinessKey,
    pub version: Version,
    pub valid_from: Timestamp,
    #[serde(default)]
    pub valid_to: Option<Timestamp>,
}

impl Envelope {
    /// Envelope for the first version of a new entity.
    pub fn first(business_key: BusinessKey, valid_from: Timestamp) -> Self {
        Self {
            surrogate_key: SurrogateKey::generate(),
            business_key,
            version: Version::FIRST,
            valid_from,
            valid_to: None,
        }
    }

    /// Envelope for a not-yet-persisted entity.
    ///
    /// The create protocol replaces everything except the business key.
    pub fn draft(business_key: BusinessKey) -> Self {
        Self {
            surrogate_key: SurrogateKey::nil(),
            business_key,
            version: Version::FIRST,
            valid_from: Timestamp::default(),
            valid_to: None,
        }
    }

    /// Envelope for the row that supersedes this one.
    pub fn successor(&self, version: Version, valid_from: Timestamp) -> Self {
        Self {
            surrogate_key: SurrogateKey::generate(),
            business_key: self.business_key.clone(),
            version,
            valid_from,
            valid_to: None,
        }
    }

    pub fn is_latest(&self) -> bool {
        self.valid_to.is_none()
    }

    /// Set `valid_to`. A second call is a logic error.
    pub fn close(&mut self, at: Timestamp) -> Result<(), TypeError> {
        if let Some(closed_at) = self.valid_to {
            return Err(TypeError::AlreadyClosed {
                surrogate_key: self.surrogate_key,
                closed_at,
            });
        }
        if at < self.valid_from {
            return Err(TypeError::CloseBeforeOpen {
                surrogate_key: self.surrogate_key,
                valid_from: self.valid_from,
                at,
            });
        }
        self.valid_to = Some(at);
        Ok(())
    }

    /// Whether `t` falls inside `[valid_from, valid_to)`.
    pub fn contains(&self, t: Timestamp) -> bool {
        self.valid_from <= t && self.valid_to.map_or(true, |end| end > t)
    }
}

/// Anything that embeds an [`Envelope`].
///
/// The engine is generic over this capability; concrete entity types only
/// implement the two accessors.
pub trait Versioned {
    fn envelope(&self) -> &Envelope;
    fn envelope_mut(&mut self) -> &mut Envelope;

    fn surrogate_key(&self) -> SurrogateKey {
        self.envelope().surrogate_key
    }

    fn business_key(&self) -> &BusinessKey {
        &self.envelope().business_key
    }

    fn version(&self) -> Version {
        self.envelope().version
    }

    fn valid_from(&self) -> Timestamp {
        self.envelope().valid_from
    }

    fn valid_to(&self) -> Option<Timestamp> {
        self.envelope().valid_to
    }

    fn is_latest(&self) -> bool {
        self.envelope().is_latest()
    }

    fn close(&mut self, at: Timestamp) -> Result<(), TypeError> {
        self.envelope_mut().close(at)
    }
}

impl Versioned for Envelope {
    fn envelope(&self) -> &Envelope {
        self
    }

    fn envelope_mut(&mut self) -> &mut Envelope {
        self
    }
}
