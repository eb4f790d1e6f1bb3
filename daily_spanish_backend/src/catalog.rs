//! Read-only exercise, achievement and curiosity tables, loaded once at start.

use crate::errors::*;
use crate::models::Level;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exercise {
    /// `"{category}_{index}"`, stable across restarts as long as the file keeps its order.
    pub id: String,
    pub category: String,
    pub index: usize,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_index: usize,
}

impl Exercise {
    pub fn correct_text(&self) -> &str {
        &self.options[self.correct_index]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementInfo {
    pub name: String,
    pub description: String,
    pub icon: String,
}

impl AchievementInfo {
    pub fn new(name: &str, description: &str, icon: &str) -> Self {
        AchievementInfo {
            name: name.into(),
            description: description.into(),
            icon: icon.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curiosity {
    #[serde(alias = "categoria")]
    pub category: String,
    #[serde(alias = "texto")]
    pub text: String,
}

#[derive(Deserialize)]
struct RawExercise {
    #[serde(alias = "pregunta")]
    question: String,
    #[serde(alias = "opciones")]
    options: Vec<String>,
    #[serde(alias = "respuesta")]
    answer: usize,
}

#[derive(Deserialize)]
struct RawCuriosities {
    #[serde(alias = "curiosidades")]
    curiosities: Vec<Curiosity>,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    levels: HashMap<Level, Vec<Exercise>>,
    achievements: Vec<AchievementInfo>,
    curiosities: Vec<Curiosity>,
}

pub fn default_achievements() -> Vec<AchievementInfo> {
    use crate::achievement::{NEW_STUDENT, APPRENTICE, EXPERT, AMBASSADOR};
    vec![
        AchievementInfo::new(NEW_STUDENT, "Joined and started practicing.", "🎓"),
        AchievementInfo::new(APPRENTICE, "Answered 10 exercises correctly.", "📘"),
        AchievementInfo::new(EXPERT, "Answered 50 exercises correctly.", "🏆"),
        AchievementInfo::new(AMBASSADOR, "Invited a friend who joined.", "🤝"),
    ]
}

impl Catalog {

    /// Parses the exercise table: `{ level: { category: [ {question, options, answer} ] } }`.
    pub fn from_json(json: &str) -> Result<Catalog> {
        let raw: HashMap<String, BTreeMap<String, Vec<RawExercise>>> = serde_json::from_str(json)
            .chain_err(|| ErrorKind::BadCatalog("not a level → category → exercises object".into()))?;

        let mut levels = HashMap::new();
        for (level_name, categories) in raw {
            let level: Level = level_name.parse()
                .chain_err(|| ErrorKind::BadCatalog(format!("unknown level {:?}", level_name)))?;

            let exercises: &mut Vec<Exercise> = levels.entry(level).or_insert_with(Vec::new);
            for (category, items) in categories {
                for (index, item) in items.into_iter().enumerate() {
                    exercises.push(build_exercise(&category, index, item)?);
                }
            }
        }

        for level in &Level::ALL {
            if levels.get(level).map_or(true, |e| e.is_empty()) {
                warn!("The catalog has no exercises for level {}.", level);
            }
        }

        Ok(Catalog {
            levels,
            achievements: default_achievements(),
            curiosities: vec![],
        })
    }

    pub fn load(exercises_path: &Path) -> Result<Catalog> {
        let json = fs::read_to_string(exercises_path)
            .chain_err(|| format!("Can't read the exercise catalog at {:?}", exercises_path))?;
        let catalog = Catalog::from_json(&json)?;
        info!("Loaded {} exercises from {:?}.", catalog.len(), exercises_path);
        Ok(catalog)
    }

    pub fn with_curiosities_json(mut self, json: &str) -> Result<Catalog> {
        let raw: RawCuriosities = serde_json::from_str(json)?;
        self.curiosities = raw.curiosities;
        Ok(self)
    }

    /// Curiosities are optional; a missing file just means there are none.
    pub fn with_curiosities_file(self, path: &Path) -> Result<Catalog> {
        if !path.exists() {
            info!("No curiosities file at {:?}.", path);
            return Ok(self);
        }
        let json = fs::read_to_string(path)?;
        self.with_curiosities_json(&json)
    }

    pub fn with_achievements(mut self, achievements: Vec<AchievementInfo>) -> Catalog {
        self.achievements = achievements;
        self
    }

    pub fn exercises(&self, level: Level) -> &[Exercise] {
        self.levels.get(&level).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn exercise(&self, level: Level, id: &str) -> Option<&Exercise> {
        self.exercises(level).iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.levels.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn achievement(&self, name: &str) -> Option<&AchievementInfo> {
        self.achievements.iter().find(|a| a.name == name)
    }

    pub fn achievements(&self) -> &[AchievementInfo] {
        &self.achievements
    }

    pub fn random_curiosity<R: Rng>(&self, rng: &mut R) -> Option<&Curiosity> {
        self.curiosities.choose(rng)
    }
}

fn build_exercise(category: &str, index: usize, raw: RawExercise) -> Result<Exercise> {
    let id = format!("{}_{}", category, index);
    if raw.options.is_empty() {
        bail!(ErrorKind::BadCatalog(format!("exercise {} has no options", id)));
    }
    if raw.answer >= raw.options.len() {
        bail!(ErrorKind::BadCatalog(format!(
            "exercise {} has answer {} but only {} options", id, raw.answer, raw.options.len())));
    }
    Ok(Exercise {
        id,
        category: category.into(),
        index,
        prompt: raw.question,
        options: raw.options,
        correct_index: raw.answer,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempdir::TempDir;

    pub const SAMPLE: &str = r#"{
        "beginner": {
            "animals": [
                {"question": "What is 'dog'?", "options": ["gato", "perro", "pez"], "answer": 1},
                {"question": "What is 'cat'?", "options": ["gato", "perro", "pez"], "answer": 0}
            ],
            "colors": [
                {"question": "What is 'red'?", "options": ["azul", "rojo"], "answer": 1}
            ]
        },
        "intermedio": {
            "verbs": [
                {"pregunta": "Yo ___ (ser) estudiante.", "opciones": ["soy", "estoy"], "respuesta": 0}
            ]
        },
        "advanced": {
            "subjunctive": [
                {"question": "Espero que ___ bien.", "options": ["estás", "estés"], "answer": 1},
                {"question": "Ojalá ___ mañana.", "options": ["llueva", "llueve"], "answer": 0}
            ]
        }
    }"#;

    pub fn sample() -> Catalog {
        Catalog::from_json(SAMPLE).unwrap()
    }

    #[test]
    fn ids_are_category_and_index() {
        let catalog = sample();
        let ids: Vec<&str> = catalog.exercises(Level::Beginner).iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["animals_0", "animals_1", "colors_0"]);
        assert_eq!(catalog.exercise(Level::Intermediate, "verbs_0").unwrap().correct_text(), "soy");
        assert_eq!(catalog.len(), 6);
    }

    #[test]
    fn rejects_out_of_range_answer() {
        let json = r#"{"beginner": {"x": [{"question": "?", "options": ["a"], "answer": 1}]}}"#;
        match Catalog::from_json(json) {
            Err(Error(ErrorKind::BadCatalog(reason), _)) => assert!(reason.contains("x_0")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_level() {
        let json = r#"{"expert": {}}"#;
        assert!(Catalog::from_json(json).is_err());
    }

    #[test]
    fn loads_from_files() {
        let dir = TempDir::new("catalog").unwrap();
        let exercises = dir.path().join("exercises.json");
        File::create(&exercises).unwrap().write_all(SAMPLE.as_bytes()).unwrap();
        let curiosities = dir.path().join("curiosities.json");
        File::create(&curiosities).unwrap()
            .write_all(r#"{"curiosidades": [{"categoria": "historia", "texto": "La ñ viene de nn."}]}"#.as_bytes())
            .unwrap();

        let catalog = Catalog::load(&exercises).unwrap()
            .with_curiosities_file(&curiosities).unwrap()
            .with_curiosities_file(&dir.path().join("missing.json")).unwrap();
        let curiosity = catalog.random_curiosity(&mut rand::thread_rng()).unwrap();
        assert_eq!(curiosity.category, "historia");
        assert!(catalog.achievement("Ambassador").is_some());
    }
}
