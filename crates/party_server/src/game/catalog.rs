//! Word catalog for the impostor game.
//!
//! A catalog maps a category key (e.g. `"animals"`) to a display name and the
//! set of secret words a round may draw from. The built-in catalog ships six
//! categories; deployments can add more through configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// A category of secret words.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Stable key used in game settings (`"football_players"`)
    pub key: String,
    /// Human readable name shown to players (`"Football Players"`)
    pub name: String,
    /// Candidate secret values
    pub words: Vec<String>,
}

/// Errors raised while extending a catalog.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("category '{0}' already exists")]
    DuplicateCategory(String),
    #[error("category '{0}' has no words")]
    EmptyCategory(String),
}

/// The set of categories a round can be drawn from.
///
/// Categories are kept in a `BTreeMap` so iteration order is stable, which
/// keeps seeded selections reproducible in tests.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    categories: BTreeMap<String, Category>,
}

const BUILTIN: &[(&str, &str, &[&str])] = &[
    (
        "football_players",
        "Football Players",
        &[
            "Lionel Messi", "Cristiano Ronaldo", "Neymar", "Kylian Mbappé",
            "Erling Haaland", "Kevin De Bruyne", "Mohamed Salah", "Robert Lewandowski",
            "Karim Benzema", "Luka Modrić", "Virgil van Dijk", "Sadio Mané",
            "Harry Kane", "Raheem Sterling", "Jadon Sancho", "Phil Foden",
        ],
    ),
    (
        "movies",
        "Movies",
        &[
            "The Godfather", "Titanic", "Avatar", "Star Wars",
            "Jurassic Park", "The Lion King", "Frozen", "Black Panther",
            "Avengers: Endgame", "Spider-Man", "Batman", "Superman",
            "Wonder Woman", "Iron Man", "Thor", "Captain America",
        ],
    ),
    (
        "animals",
        "Animals",
        &[
            "Lion", "Tiger", "Elephant", "Giraffe",
            "Penguin", "Dolphin", "Eagle", "Shark",
            "Kangaroo", "Koala", "Panda", "Gorilla",
            "Zebra", "Hippo", "Rhino", "Cheetah",
        ],
    ),
    (
        "countries",
        "Countries",
        &[
            "United States", "Canada", "Mexico", "Brazil",
            "Argentina", "Chile", "Peru", "Colombia",
            "France", "Germany", "Italy", "Spain",
            "United Kingdom", "Japan", "China", "India",
        ],
    ),
    (
        "foods",
        "Foods",
        &[
            "Pizza", "Burger", "Sushi", "Pasta",
            "Taco", "Burrito", "Curry", "Ramen",
            "Steak", "Salmon", "Chicken", "Lobster",
            "Ice Cream", "Chocolate", "Cake", "Cookie",
        ],
    ),
    (
        "colors",
        "Colors",
        &[
            "Red", "Blue", "Green", "Yellow",
            "Purple", "Orange", "Pink", "Brown",
            "Black", "White", "Gray", "Cyan",
            "Magenta", "Teal", "Navy", "Maroon",
        ],
    ),
];

impl Catalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the catalog that ships with the server.
    pub fn builtin() -> Self {
        let categories = BUILTIN
            .iter()
            .map(|(key, name, words)| {
                let category = Category {
                    key: (*key).to_string(),
                    name: (*name).to_string(),
                    words: words.iter().map(|w| (*w).to_string()).collect(),
                };
                ((*key).to_string(), category)
            })
            .collect();
        Self { categories }
    }

    /// Adds a category, refusing duplicate keys and empty word lists.
    pub fn add(&mut self, category: Category) -> Result<(), CatalogError> {
        if category.words.is_empty() {
            return Err(CatalogError::EmptyCategory(category.key));
        }
        if self.categories.contains_key(&category.key) {
            return Err(CatalogError::DuplicateCategory(category.key));
        }
        self.categories.insert(category.key.clone(), category);
        Ok(())
    }

    /// Looks up a category by key.
    pub fn get(&self, key: &str) -> Option<&Category> {
        self.categories.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.categories.contains_key(key)
    }

    /// All categories in key order.
    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Resolves a settings whitelist to the categories eligible for selection.
    ///
    /// An empty whitelist means every category. Unknown keys are skipped here;
    /// settings validation rejects them before a room is ever created.
    pub fn eligible<'a>(&'a self, whitelist: &[String]) -> Vec<&'a Category> {
        let picked: Vec<&Category> = whitelist.iter().filter_map(|key| self.get(key)).collect();
        if picked.is_empty() {
            self.categories().collect()
        } else {
            picked
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_has_six_full_categories() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.len(), 6);
        for category in catalog.categories() {
            assert_eq!(category.words.len(), 16, "category {}", category.key);
        }
        assert_eq!(catalog.get("movies").unwrap().name, "Movies");
    }

    #[test]
    fn add_rejects_duplicates_and_empty_categories() {
        let mut catalog = Catalog::builtin();
        let dup = Category {
            key: "animals".into(),
            name: "More Animals".into(),
            words: vec!["Otter".into()],
        };
        assert_eq!(catalog.add(dup), Err(CatalogError::DuplicateCategory("animals".into())));

        let empty = Category { key: "cars".into(), name: "Cars".into(), words: vec![] };
        assert_eq!(catalog.add(empty), Err(CatalogError::EmptyCategory("cars".into())));

        let cars = Category { key: "cars".into(), name: "Cars".into(), words: vec!["Mini".into()] };
        catalog.add(cars).unwrap();
        assert!(catalog.contains("cars"));
    }

    #[test]
    fn empty_whitelist_means_every_category() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.eligible(&[]).len(), 6);

        let only = catalog.eligible(&["colors".to_string(), "foods".to_string()]);
        let keys: Vec<&str> = only.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["colors", "foods"]);
    }
}
