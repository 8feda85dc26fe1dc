// src/preferences.rs
use lazy_static::lazy_static;
use log::{debug, error};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::storage::local::{self, LocalStorage, StorageError};

/// UI locale. Codes outside the supported set are kept verbatim and simply
/// have no dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Language {
    En,
    Fr,
    Ar,
    Other(String),
}

impl Language {
    pub fn code(&self) -> &str {
        match self {
            Self::En => "en",
            Self::Fr => "fr",
            Self::Ar => "ar",
            Self::Other(code) => code,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Self::Ar => Direction::Rtl,
            _ => Direction::Ltr,
        }
    }
}

impl From<&str> for Language {
    fn from(code: &str) -> Self {
        match code {
            "en" => Self::En,
            "fr" => Self::Fr,
            "ar" => Self::Ar,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for Language {
    fn from(code: String) -> Self {
        Self::from(code.as_str())
    }
}

impl From<Language> for String {
    fn from(lang: Language) -> Self {
        lang.code().to_string()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Self::Dark => Self::Light,
            Self::Light => Self::Dark,
        }
    }

    pub fn class(&self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Light => "light",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ltr,
    Rtl,
}

/// Global attributes the page root mirrors after every preference change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentAttributes {
    pub lang: String,
    pub dir: Direction,
    pub theme_class: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreferenceSnapshot {
    pub language: Language,
    pub theme: Theme,
    pub document: DocumentAttributes,
}

lazy_static! {
    static ref DICTIONARIES: HashMap<&'static str, HashMap<&'static str, &'static str>> = {
        let mut all = HashMap::new();
        all.insert("en", HashMap::from([
            ("nav.home", "Home"),
            ("nav.about", "About"),
            ("nav.features", "Features"),
            ("nav.community", "Community"),
            ("nav.support", "Support"),
            ("hero.title", "Welcome to KindreD"),
            ("hero.cta", "Join the server"),
            ("status.online", "ONLINE"),
            ("status.offline", "OFFLINE"),
            ("status.loading", "Checking server..."),
            ("status.players", "Players"),
            ("support.title", "Contact support"),
            ("support.sent", "Your ticket has been sent"),
            ("support.saved_locally", "Your ticket was saved on this device and will be sent later"),
            ("announcements.title", "Announcements"),
            ("announcements.empty", "No announcements yet"),
        ]));
        all.insert("fr", HashMap::from([
            ("nav.home", "Accueil"),
            ("nav.about", "À propos"),
            ("nav.features", "Fonctionnalités"),
            ("nav.community", "Communauté"),
            ("nav.support", "Support"),
            ("hero.title", "Bienvenue sur KindreD"),
            ("hero.cta", "Rejoindre le serveur"),
            ("status.online", "EN LIGNE"),
            ("status.offline", "HORS LIGNE"),
            ("status.loading", "Vérification du serveur..."),
            ("status.players", "Joueurs"),
            ("support.title", "Contacter le support"),
            ("support.sent", "Votre ticket a été envoyé"),
            ("announcements.title", "Annonces"),
        ]));
        all.insert("ar", HashMap::from([
            ("nav.home", "الرئيسية"),
            ("nav.about", "حول"),
            ("nav.features", "المميزات"),
            ("nav.community", "المجتمع"),
            ("nav.support", "الدعم"),
            ("hero.title", "مرحبا بك في KindreD"),
            ("status.online", "متصل"),
            ("status.offline", "غير متصل"),
            ("status.players", "اللاعبون"),
            ("support.title", "تواصل مع الدعم"),
            ("announcements.title", "الإعلانات"),
        ]));
        all
    };
}

/// Looks `key` up in `lang`'s dictionary, falling back to the key itself.
pub fn translate<'a>(lang: &Language, key: &'a str) -> &'a str {
    DICTIONARIES
        .get(lang.code())
        .and_then(|dict| dict.get(key))
        .copied()
        .unwrap_or(key)
}

struct Prefs {
    language: Language,
    theme: Theme,
    document: DocumentAttributes,
}

/// Language and theme for the whole site, mirrored to local storage.
pub struct PreferenceStore {
    storage: Arc<LocalStorage>,
    inner: RwLock<Prefs>,
}

impl PreferenceStore {
    pub fn load(storage: Arc<LocalStorage>) -> Self {
        let language = storage
            .get::<String>(local::LANGUAGE)
            .map(Language::from)
            .unwrap_or(Language::En);
        let theme = storage.get::<Theme>(local::THEME).unwrap_or(Theme::Dark);
        debug!("Loaded preferences: language={}, theme={}", language, theme.class());
        let document = Self::document(&language, theme);
        Self {
            storage,
            inner: RwLock::new(Prefs {
                language,
                theme,
                document,
            }),
        }
    }

    fn document(language: &Language, theme: Theme) -> DocumentAttributes {
        DocumentAttributes {
            lang: language.code().to_string(),
            dir: language.direction(),
            theme_class: theme.class(),
        }
    }

    pub fn set_language(&self, lang: impl Into<Language>) -> Result<PreferenceSnapshot, StorageError> {
        let lang = lang.into();
        {
            let mut prefs = self.inner.write();
            prefs.document = Self::document(&lang, prefs.theme);
            prefs.language = lang.clone();
        }
        if let Err(e) = self.storage.set(local::LANGUAGE, &lang.code()) {
            error!("Failed to persist language: {}", e);
            return Err(e);
        }
        Ok(self.snapshot())
    }

    pub fn toggle_theme(&self) -> Result<PreferenceSnapshot, StorageError> {
        let theme = {
            let mut prefs = self.inner.write();
            prefs.theme = prefs.theme.toggled();
            prefs.document.theme_class = prefs.theme.class();
            prefs.theme
        };
        if let Err(e) = self.storage.set(local::THEME, &theme) {
            error!("Failed to persist theme: {}", e);
            return Err(e);
        }
        Ok(self.snapshot())
    }

    pub fn t(&self, key: &str) -> String {
        let prefs = self.inner.read();
        translate(&prefs.language, key).to_string()
    }

    pub fn language(&self) -> Language {
        self.inner.read().language.clone()
    }

    pub fn snapshot(&self) -> PreferenceSnapshot {
        let prefs = self.inner.read();
        PreferenceSnapshot {
            language: prefs.language.clone(),
            theme: prefs.theme,
            document: prefs.document.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (PreferenceStore, Arc<LocalStorage>) {
        let storage = Arc::new(LocalStorage::in_memory());
        (PreferenceStore::load(Arc::clone(&storage)), storage)
    }

    #[test]
    fn defaults_to_english_dark() {
        let (prefs, _) = store();
        let snap = prefs.snapshot();
        assert_eq!(snap.language, Language::En);
        assert_eq!(snap.theme, Theme::Dark);
        assert_eq!(snap.document.dir, Direction::Ltr);
        assert_eq!(snap.document.theme_class, "dark");
    }

    #[test]
    fn loads_saved_values() {
        let storage = Arc::new(LocalStorage::in_memory());
        storage.set(local::LANGUAGE, &"ar").unwrap();
        storage.set(local::THEME, &Theme::Light).unwrap();
        let prefs = PreferenceStore::load(storage);
        assert_eq!(prefs.language(), Language::Ar);
        assert_eq!(prefs.snapshot().theme, Theme::Light);
        assert_eq!(prefs.snapshot().document.dir, Direction::Rtl);
    }

    #[test]
    fn arabic_switches_direction() {
        let (prefs, storage) = store();
        let snap = prefs.set_language("ar").unwrap();
        assert_eq!(snap.document.dir, Direction::Rtl);
        assert_eq!(snap.document.lang, "ar");
        assert_eq!(storage.get::<String>(local::LANGUAGE).as_deref(), Some("ar"));

        let snap = prefs.set_language("fr").unwrap();
        assert_eq!(snap.document.dir, Direction::Ltr);
    }

    #[test]
    fn toggling_twice_restores_theme() {
        let (prefs, storage) = store();
        let original = prefs.snapshot().theme;

        prefs.toggle_theme().unwrap();
        assert_eq!(prefs.snapshot().theme, original.toggled());
        assert_eq!(storage.get::<Theme>(local::THEME), Some(original.toggled()));

        let snap = prefs.toggle_theme().unwrap();
        assert_eq!(snap.theme, original);
        assert_eq!(snap.document.theme_class, original.class());
        assert_eq!(storage.get::<Theme>(local::THEME), Some(original));
    }

    #[test]
    fn translation_hits_and_misses() {
        let (prefs, _) = store();
        assert_eq!(prefs.t("nav.home"), "Home");
        assert_eq!(prefs.t("no.such.key"), "no.such.key");

        prefs.set_language("fr").unwrap();
        assert_eq!(prefs.t("nav.home"), "Accueil");
        // present in English only
        assert_eq!(prefs.t("announcements.empty"), "announcements.empty");
    }

    #[test]
    fn every_dictionary_entry_is_returned() {
        for (code, dict) in DICTIONARIES.iter() {
            let lang = Language::from(*code);
            for (key, value) in dict {
                assert_eq!(translate(&lang, key), *value);
            }
        }
    }

    #[test]
    fn unsupported_language_is_stored_and_falls_back_to_keys() {
        let (prefs, storage) = store();
        let snap = prefs.set_language("de").unwrap();
        assert_eq!(snap.language, Language::Other("de".into()));
        assert_eq!(snap.document.dir, Direction::Ltr);
        assert_eq!(prefs.t("nav.home"), "nav.home");
        assert_eq!(storage.get::<String>(local::LANGUAGE).as_deref(), Some("de"));
    }
}
