//! Transported items and the pool that creates them.

use crate::error::SimError;
use crate::id::ItemId;
use flowsim_common::consts::{DEFAULT_ITEM_LENGTH, ITEM_ID_BASE, ITEM_WEIGHT_RANGE};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;

const ARTICLES: &[&str] = &[
    "Bottled water",
    "Memory cards",
    "Apples",
    "Ballpoint pens",
    "Coffee beans",
    "Webcam",
    "Mouse",
    "Keyboard",
    "Notebook",
    "Phone",
    "Peanuts",
    "Board game",
    "Dev board",
    "Camera",
    "Headset",
    "Paperback",
    "Model plane",
    "Toy car",
    "Milk",
    "Chocolate",
    "Tickets",
];

/// Passive value moved along the line.
///
/// Items are never cloned inside the core; ownership moves from segment to
/// segment.
#[derive(Debug, PartialEq, Serialize)]
pub struct Item {
    id: ItemId,
    length: f64,
    weight: u8,
    article: &'static str,
}

impl Item {
    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    /// Weight in kilograms.
    pub fn weight(&self) -> u8 {
        self.weight
    }

    pub fn article(&self) -> &'static str {
        self.article
    }
}

/// Explicit item factory owned by the plant.
///
/// Identifiers are sequential from [`ITEM_ID_BASE`]; weight and article are
/// drawn from a seeded generator so that runs are reproducible.
#[derive(Debug)]
pub struct ItemPool {
    next_id: u64,
    default_length: f64,
    rng: StdRng,
}

impl ItemPool {
    /// Pool with the given default item length.
    ///
    /// # Errors
    /// `InvalidParameter` if `default_length` is not positive.
    pub fn new(default_length: f64, seed: Option<u64>) -> Result<Self, SimError> {
        if !(default_length.is_finite() && default_length > 0.0) {
            return Err(SimError::InvalidParameter(format!(
                "item length must be positive, got {default_length}"
            )));
        }
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            next_id: ITEM_ID_BASE,
            default_length,
            rng,
        })
    }

    /// Pool with default length and a fixed seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            next_id: ITEM_ID_BASE,
            default_length: DEFAULT_ITEM_LENGTH,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn default_length(&self) -> f64 {
        self.default_length
    }

    /// Create an item of the default length.
    pub fn next_item(&mut self) -> Item {
        let length = self.default_length;
        self.item_with_length(length)
    }

    /// Create an item of a given length.
    ///
    /// Non-positive lengths fall back to the default length.
    pub fn item_with_length(&mut self, length: f64) -> Item {
        let id = ItemId(self.next_id);
        self.next_id += 1;
        let length = if length.is_finite() && length > 0.0 {
            length
        } else {
            self.default_length
        };
        let (lo, hi) = ITEM_WEIGHT_RANGE;
        Item {
            id,
            length,
            weight: self.rng.gen_range(lo..=hi),
            article: ARTICLES.choose(&mut self.rng).copied().unwrap_or("Parcel"),
        }
    }

    /// Number of items created so far.
    pub fn created(&self) -> u64 {
        self.next_id - ITEM_ID_BASE
    }
}

impl Default for ItemPool {
    fn default() -> Self {
        Self::seeded(0)
    }
}
