use crate::constants::DEFAULT_PALETTE;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// `#rrggbb`, alpha omitted
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn to_array(&self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// A category and the color it was given
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegendEntry {
    pub category: String,
    pub color: Color,
}

/// Category → color assignments of one layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryColorMap {
    pub layer_id: String,
    pub assigned: IndexMap<String, Color>,
    #[serde(skip)]
    palette: Vec<Color>,
}

impl CategoryColorMap {
    /// Assigned color for a known category
    pub fn get(&self, value: &str) -> Option<Color> {
        self.assigned.get(value).copied()
    }

    /// Known categories use their assigned color; anything else is hashed
    /// together with the layer id onto the palette.
    pub fn color_for(&self, value: &str) -> Color {
        self.get(value)
            .unwrap_or_else(|| hashed_color(&self.palette, &self.layer_id, value))
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.assigned.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }

    pub fn legend(&self) -> Vec<LegendEntry> {
        self.assigned
            .iter()
            .map(|(category, color)| LegendEntry {
                category: category.clone(),
                color: *color,
            })
            .collect()
    }
}

fn hashed_color(palette: &[Color], layer_id: &str, value: &str) -> Color {
    let palette = if palette.is_empty() {
        &DEFAULT_PALETTE[..]
    } else {
        palette
    };
    let hash = fxhash::hash64(&(layer_id, value));
    palette[(hash % palette.len() as u64) as usize]
}

/// Assigns palette colors to categories in first-seen order
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryColorAssigner {
    palette: Vec<Color>,
}

impl Default for CategoryColorAssigner {
    fn default() -> Self {
        Self::new(DEFAULT_PALETTE.to_vec())
    }
}

impl CategoryColorAssigner {
    /// An empty palette falls back to the default one
    pub fn new(palette: Vec<Color>) -> Self {
        let palette = if palette.is_empty() {
            DEFAULT_PALETTE.to_vec()
        } else {
            palette
        };
        Self { palette }
    }

    pub fn palette(&self) -> &[Color] {
        &self.palette
    }

    /// The n-th distinct category gets `palette[n % len]`. Repeated values
    /// keep their first assignment.
    pub fn assign<I, S>(&self, layer_id: &str, categories: I) -> CategoryColorMap
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut assigned: IndexMap<String, Color> = IndexMap::new();
        for category in categories {
            let category = category.as_ref();
            if !assigned.contains_key(category) {
                let color = self.palette[assigned.len() % self.palette.len()];
                assigned.insert(category.to_string(), color);
            }
        }
        CategoryColorMap {
            layer_id: layer_id.to_string(),
            assigned,
            palette: self.palette.clone(),
        }
    }

    /// Color for a value outside any known category set
    pub fn hashed_color(&self, layer_id: &str, value: &str) -> Color {
        hashed_color(&self.palette, layer_id, value)
    }
}
