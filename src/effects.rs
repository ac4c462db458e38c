/*!
 # Effect modes for LED lights

 This module defines the built-in animated effects the firmware knows about,
 keyed by a short alias (`fade7`, `strobe_red`, `jump7`, ...) and a full
 descriptive name. Effect IDs are the single byte the device expects in the
 Effect command and in effect alarm slots.
*/

use tracing::{debug, trace, warn};

use crate::{Error, Result};

/// A built-in effect mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Effect {
    /// Short command-line alias
    pub alias: &'static str,
    /// Device effect ID
    pub id: u8,
    /// Human readable name
    pub name: &'static str,
}

/// Lowest effect id the firmware accepts
pub const FIRST_EFFECT_ID: u8 = 0x25;

/// Predefined effects with their command values
pub const EFFECTS: &[Effect] = &[
    Effect {
        alias: "fade7",
        id: 0x25,
        name: "Seven color cross fade",
    },
    Effect {
        alias: "fade_red",
        id: 0x26,
        name: "Red gradual change",
    },
    Effect {
        alias: "fade_green",
        id: 0x27,
        name: "Green gradual change",
    },
    Effect {
        alias: "fade_blue",
        id: 0x28,
        name: "Blue gradual change",
    },
    Effect {
        alias: "fade_yellow",
        id: 0x29,
        name: "Yellow gradual change",
    },
    Effect {
        alias: "fade_cyan",
        id: 0x2a,
        name: "Cyan gradual change",
    },
    Effect {
        alias: "fade_purple",
        id: 0x2b,
        name: "Purple gradual change",
    },
    Effect {
        alias: "fade_white",
        id: 0x2c,
        name: "White gradual change",
    },
    Effect {
        alias: "cross_rg",
        id: 0x2d,
        name: "Red green cross fade",
    },
    Effect {
        alias: "cross_rb",
        id: 0x2e,
        name: "Red blue cross fade",
    },
    Effect {
        alias: "cross_gb",
        id: 0x2f,
        name: "Green blue cross fade",
    },
    Effect {
        alias: "strobe7",
        id: 0x30,
        name: "Seven color strobe flash",
    },
    Effect {
        alias: "strobe_red",
        id: 0x31,
        name: "Red strobe flash",
    },
    Effect {
        alias: "strobe_green",
        id: 0x32,
        name: "Green strobe flash",
    },
    Effect {
        alias: "strobe_blue",
        id: 0x33,
        name: "Blue strobe flash",
    },
    Effect {
        alias: "strobe_yellow",
        id: 0x34,
        name: "Yellow strobe flash",
    },
    Effect {
        alias: "strobe_cyan",
        id: 0x35,
        name: "Cyan strobe flash",
    },
    Effect {
        alias: "strobe_purple",
        id: 0x36,
        name: "Purple strobe flash",
    },
    Effect {
        alias: "strobe_white",
        id: 0x37,
        name: "White strobe flash",
    },
    Effect {
        alias: "jump7",
        id: 0x38,
        name: "Seven color jumping change",
    },
];

/// Every built-in effect, in id order
pub fn list() -> &'static [Effect] {
    EFFECTS
}

/// All known aliases, in table order
pub fn aliases() -> Vec<String> {
    EFFECTS.iter().map(|e| e.alias.to_string()).collect()
}

/// Resolves an alias (case-insensitive, exact) to its effect ID
pub fn resolve(name: &str) -> Result<u8> {
    let wanted = name.trim().to_ascii_lowercase();
    match EFFECTS.iter().find(|e| e.alias == wanted) {
        Some(effect) => {
            trace!("Effect '{}' resolved to {:#04x}", name, effect.id);
            Ok(effect.id)
        }
        None => {
            warn!("Unknown effect alias '{}'", name);
            Err(Error::UnknownEffectAlias {
                name: name.to_string(),
                valid: aliases(),
            })
        }
    }
}

/// Resolves a name against aliases first, then by normalized substring
/// against the full effect names ("red strobe" finds "Red strobe flash").
pub fn lookup(name: &str) -> Result<u8> {
    if let Ok(id) = resolve(name) {
        return Ok(id);
    }

    let needle = normalize(name);
    if needle.is_empty() {
        return Err(Error::UnknownEffectAlias {
            name: name.to_string(),
            valid: aliases(),
        });
    }

    match EFFECTS.iter().find(|e| normalize(e.name).contains(&needle)) {
        Some(effect) => {
            debug!("Effect '{}' fuzzy-matched '{}'", name, effect.name);
            Ok(effect.id)
        }
        None => Err(Error::UnknownEffectAlias {
            name: name.to_string(),
            valid: aliases(),
        }),
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_aliases() {
        assert_eq!(resolve("fade7").unwrap(), 0x25);
        assert_eq!(resolve("strobe7").unwrap(), 0x30);
        assert_eq!(resolve("jump7").unwrap(), 0x38);
        assert_eq!(EFFECTS.len(), 20);
    }

    #[test]
    fn test_alias_is_case_insensitive() {
        assert_eq!(resolve("FADE7").unwrap(), 0x25);
        assert_eq!(resolve(" Strobe_Red ").unwrap(), 0x31);
    }

    #[test]
    fn test_unknown_alias_lists_valid_names() {
        match resolve("disco") {
            Err(Error::UnknownEffectAlias { name, valid }) => {
                assert_eq!(name, "disco");
                assert_eq!(valid.len(), EFFECTS.len());
                assert!(valid.contains(&"jump7".to_string()));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_fuzzy_lookup() {
        assert_eq!(lookup("red strobe").unwrap(), 0x31);
        assert_eq!(lookup("Green-Blue cross").unwrap(), 0x2f);
        assert!(lookup("").is_err());
        assert!(lookup("rainbow").is_err());
    }

    #[test]
    fn test_alias_wins_over_fuzzy() {
        assert_eq!(lookup("cross_rg").unwrap(), 0x2d);
        assert_eq!(lookup("jump7").unwrap(), 0x38);
    }

    #[test]
    fn test_ids_are_unique() {
        for (i, a) in EFFECTS.iter().enumerate() {
            for b in &EFFECTS[i + 1..] {
                assert_ne!(a.id, b.id, "{} and {} share an id", a.alias, b.alias);
            }
        }
    }

    #[test]
    fn test_list_is_id_ordered() {
        let ids: Vec<u8> = list().iter().map(|e| e.id).collect();
        assert_eq!(ids.len(), 20);
        assert_eq!(ids[0], FIRST_EFFECT_ID);
        assert!(ids.windows(2).all(|w| w[1] == w[0] + 1));
        assert_eq!(list()[11].alias, "strobe7");
    }
}
