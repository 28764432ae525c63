//! The fixed era catalog and the prompts built from it.

use serde::Serialize;

/// A point in time a scene can be rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Era {
    /// Representative year.
    pub year: u16,
    /// Short label shown in the selector.
    pub label: &'static str,
    /// What the era looks like.
    pub description: &'static str,
    /// Zero-based position in [`ERAS`].
    pub index: usize,
}

/// Index of the present-day era; generation always starts here.
pub const MODERN_ERA_INDEX: usize = 4;

/// Every era, oldest first.
pub static ERAS: [Era; 6] = [
    Era {
        year: 1900,
        label: "1900s",
        description: "Horse carriages, cobblestone streets",
        index: 0,
    },
    Era {
        year: 1910,
        label: "1910s",
        description: "Early automobiles, street lamps",
        index: 1,
    },
    Era {
        year: 1920,
        label: "1920s",
        description: "Classic cars, mid-century buildings",
        index: 2,
    },
    Era {
        year: 1950,
        label: "1950s",
        description: "Vintage cars, mid-century architecture",
        index: 3,
    },
    Era {
        year: 2025,
        label: "Modern",
        description: "Present day realistic scene",
        index: 4,
    },
    Era {
        year: 2050,
        label: "2050s",
        description: "Flying cars, futuristic skyscrapers",
        index: 5,
    },
];

/// Quick-start scene descriptions offered next to the prompt input.
pub const EXAMPLE_PROMPTS: [&str; 5] = [
    "A busy city street with tall buildings",
    "A peaceful suburban neighborhood",
    "A marketplace with vendors and shops",
    "A university campus with students",
    "A industrial district with factories",
];

const MODERN_STYLE_SUFFIX: &str = "modern street view, realistic lighting, contemporary vehicles, \
     people in modern clothing, photorealistic, high resolution";

impl Era {
    /// Looks up an era by index.
    pub fn get(index: usize) -> Option<&'static Era> {
        ERAS.get(index)
    }

    /// The present-day anchor era.
    pub fn modern() -> &'static Era {
        &ERAS[MODERN_ERA_INDEX]
    }

    /// Returns true for the present-day anchor era.
    pub fn is_modern(&self) -> bool {
        self.index == MODERN_ERA_INDEX
    }

    /// Resolves user input to an era.
    ///
    /// Accepts a label (`1950s`, `modern`), a year (`1950`) or an index (`3`).
    pub fn find(input: &str) -> Option<&'static Era> {
        let input = input.trim();
        if let Some(era) = ERAS.iter().find(|e| e.label.eq_ignore_ascii_case(input)) {
            return Some(era);
        }
        let number: u16 = input.parse().ok()?;
        ERAS.iter()
            .find(|e| e.year == number)
            .or_else(|| Era::get(usize::from(number)))
    }
}

impl std::fmt::Display for Era {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.label, self.year)
    }
}

/// Builds the text-to-image prompt for the modern base render.
pub fn modern_scene_prompt(prompt: &str) -> String {
    format!("{}, {}", prompt.trim(), MODERN_STYLE_SUFFIX)
}

/// Builds the edit instruction that moves a modern render into `era`.
pub fn era_edit_instruction(era: &Era) -> String {
    format!(
        "Transform this scene to the {label} era ({description}, around the year {year}). \
         Keep the exact same composition, camera angle and layout of streets and buildings, \
         but replace the vehicles, people's clothing, architecture details and everyday objects \
         with what would appear in the {label}, high resolution, photorealistic",
        label = era.label,
        description = era.description,
        year = era.year,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_indices_match_positions() {
        for (position, era) in ERAS.iter().enumerate() {
            assert_eq!(era.index, position);
        }
        assert!(ERAS.windows(2).all(|w| w[0].year < w[1].year));
    }

    #[test]
    fn test_modern_anchor() {
        let modern = Era::modern();
        assert_eq!(modern.label, "Modern");
        assert_eq!(modern.year, 2025);
        assert!(modern.is_modern());
        assert!(!ERAS[0].is_modern());
    }

    #[test]
    fn test_get_out_of_range() {
        assert!(Era::get(5).is_some());
        assert!(Era::get(6).is_none());
    }

    #[test]
    fn test_find_by_label_year_and_index() {
        assert_eq!(Era::find("1950s").map(|e| e.index), Some(3));
        assert_eq!(Era::find("modern").map(|e| e.index), Some(4));
        assert_eq!(Era::find("2050").map(|e| e.index), Some(5));
        assert_eq!(Era::find("0").map(|e| e.index), Some(0));
        assert!(Era::find("1800s").is_none());
        assert!(Era::find("42").is_none());
    }

    #[test]
    fn test_modern_scene_prompt() {
        let prompt = modern_scene_prompt("  A busy city street ");
        assert!(prompt.starts_with("A busy city street, "));
        assert!(prompt.contains("contemporary vehicles"));
        assert!(prompt.ends_with("photorealistic, high resolution"));
    }

    #[test]
    fn test_era_edit_instruction_names_the_era() {
        let text = era_edit_instruction(&ERAS[0]);
        assert!(text.contains("1900s"));
        assert!(text.contains("Horse carriages, cobblestone streets"));
        assert!(text.contains("1900"));
        assert!(text.contains("composition"));
        assert!(text.ends_with("high resolution, photorealistic"));
    }

    #[test]
    fn test_display() {
        assert_eq!(ERAS[3].to_string(), "1950s (1950)");
    }
}
