//! A deployment's origin file (spec §4.8): INI, section `origin`, keys
//! `refspec`, `override-commit`, `unconfigured-state`, `unlocked`.

use std::path::Path;

use crate::config::Ini;
use crate::error::OstreeResult;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Origin {
    pub refspec: String,
    pub override_commit: Option<String>,
    /// If set, the deployment refuses upgrades and surfaces this string
    /// (spec §4.8).
    pub unconfigured_state: Option<String>,
    /// Hotfix flag: a deployment whose `/usr` has been mutated out of band.
    pub unlocked: bool,
}

impl Origin {
    pub fn new(refspec: impl Into<String>) -> Self {
        Self { refspec: refspec.into(), ..Default::default() }
    }

    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        ini.set("origin", "refspec", self.refspec.as_str());
        if let Some(commit) = &self.override_commit {
            ini.set("origin", "override-commit", commit.as_str());
        }
        if let Some(state) = &self.unconfigured_state {
            ini.set("origin", "unconfigured-state", state.as_str());
        }
        if self.unlocked {
            ini.set("origin", "unlocked", "true");
        }
        ini
    }

    pub fn from_ini(ini: &Ini) -> Self {
        Self {
            refspec: ini.get("origin", "refspec").unwrap_or_default().to_string(),
            override_commit: ini.get("origin", "override-commit").map(str::to_string),
            unconfigured_state: ini.get("origin", "unconfigured-state").map(str::to_string),
            unlocked: ini.get_bool("origin", "unlocked").unwrap_or(false),
        }
    }

    pub fn save(&self, path: &Path) -> OstreeResult<()> {
        self.to_ini().save(path)
    }

    pub fn load(path: &Path) -> OstreeResult<Self> {
        Ok(Self::from_ini(&Ini::load(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_ini() {
        let mut origin = Origin::new("origin:main");
        origin.unconfigured_state = Some("managed externally".into());
        origin.unlocked = true;
        assert_eq!(Origin::from_ini(&origin.to_ini()), origin);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = crate::tests::new_temp_dir();
        let path = dir.path().join("x.origin");
        let origin = Origin::new("origin:main");
        origin.save(&path).unwrap();
        assert_eq!(Origin::load(&path).unwrap(), origin);
    }
}
