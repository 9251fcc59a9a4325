//! Card state and its transitions.
//!
//! A [`CardModel`] is an immutable snapshot of everything the renderer needs.
//! User actions are expressed as [`Action`] values and applied with
//! [`reduce`], which returns the next snapshot together with any status or
//! toast text the action produced.
//!
//! # Example
//!
//! ```
//! use trainer_card::{reduce, Action, CardModel, PokemonEntry};
//!
//! let model = CardModel::default();
//! let next = reduce(&model, Action::AddPokemon(PokemonEntry {
//!     id: 25,
//!     name: "Pikachu".into(),
//!     sprite: "https://example.invalid/25.png".into(),
//!     types: vec!["Electric".into()],
//! }));
//! assert_eq!(next.model.team.len(), 1);
//! assert_eq!(next.toast.as_deref(), Some("Pikachu added to the front!"));
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::avatar::{TrainerAvatar, default_avatars};
use crate::color::{self, Theme};
use crate::pattern::{self, PatternDescriptor, PatternKind};
use crate::pokedex::capitalize;

/// Maximum number of team slots on the card front.
pub const TEAM_SIZE: usize = 6;

/// Name shown when the trainer name is blank.
pub const DEFAULT_TRAINER_NAME: &str = "Trainer";

/// Preset card colors offered by pickers.
pub const PRESET_COLORS: [&str; 6] = [
    "#ef5350", "#1976d2", "#2e7d32", "#ab47bc", "#ff7043", "#455a64",
];

pub const TEAM_FULL_MESSAGE: &str = "All six slots are filled. Remove a Pokémon to add another.";

// ============================================================================
// Team
// ============================================================================

/// Synthetic identifier of a team slot. Used for removal only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct SlotId(pub u64);

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "slot-{}", self.0)
    }
}

/// A Pokémon as returned by the data source, before it occupies a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct PokemonEntry {
    pub id: u32,
    pub name: String,
    pub sprite: String,
    #[serde(default)]
    pub types: Vec<String>,
}

/// A Pokémon placed in a team slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct PokemonPick {
    pub slot_id: SlotId,
    pub id: u32,
    pub name: String,
    pub sprite: String,
    #[serde(default)]
    pub types: Vec<String>,
}

impl PokemonPick {
    fn from_entry(slot_id: SlotId, entry: PokemonEntry) -> Self {
        Self {
            slot_id,
            id: entry.id,
            name: entry.name,
            sprite: entry.sprite,
            types: entry.types,
        }
    }
}

// ============================================================================
// Bio
// ============================================================================

/// Free-text fields printed on the card back. Empty means unset.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct BioFields {
    pub favorite_pokemon: String,
    pub favorite_type: String,
    pub favorite_game: String,
}

// ============================================================================
// CardModel
// ============================================================================

/// Snapshot of the card being edited.
///
/// # JSON Format
///
/// ```json
/// {
///   "trainerName": "Misty",
///   "avatar": { "id": "cynthia", "name": "Champion Cynthia", "sprite": "cynthia.png" },
///   "backgroundColor": "#1976d2",
///   "pattern": "waves",
///   "patternWeightEnabled": false,
///   "patternScale": 1.0,
///   "team": [],
///   "cardBackEnabled": true,
///   "bio": { "favoritePokemon": "starmie", "favoriteType": "Water", "favoriteGame": "" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct CardModel {
    pub trainer_name: String,
    pub avatar: TrainerAvatar,
    pub background_color: String,
    pub pattern: PatternKind,
    pub pattern_weight_enabled: bool,
    pub pattern_scale: f32,
    pub team: Vec<PokemonPick>,
    pub card_back_enabled: bool,
    pub bio: BioFields,
    /// Next synthetic slot id. Only ever increases.
    pub next_slot: u64,
}

impl Default for CardModel {
    fn default() -> Self {
        Self {
            trainer_name: DEFAULT_TRAINER_NAME.to_string(),
            avatar: default_avatars()[0].clone(),
            background_color: PRESET_COLORS[0].to_string(),
            pattern: PatternKind::None,
            pattern_weight_enabled: false,
            pattern_scale: 1.0,
            team: Vec::new(),
            card_back_enabled: true,
            bio: BioFields::default(),
            next_slot: 0,
        }
    }
}

impl CardModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trainer name as printed: trimmed, or "Trainer" when blank.
    pub fn display_name(&self) -> &str {
        match self.trainer_name.trim() {
            "" => DEFAULT_TRAINER_NAME,
            name => name,
        }
    }

    pub fn background_is_light(&self) -> bool {
        color::is_light(&self.background_color)
    }

    pub fn theme(&self) -> Theme {
        Theme::for_background(self.background_is_light())
    }

    /// The scale fed to the pattern generator: the stored scale only when
    /// pattern weighting is on, exactly 1 otherwise.
    pub fn effective_pattern_scale(&self) -> f32 {
        if self.pattern_weight_enabled {
            self.pattern_scale
        } else {
            1.0
        }
    }

    pub fn pattern_descriptor(&self) -> PatternDescriptor {
        pattern::generate(
            self.pattern,
            self.background_is_light(),
            self.effective_pattern_scale(),
        )
    }

    pub fn is_team_full(&self) -> bool {
        self.team.len() >= TEAM_SIZE
    }

    /// Number of placeholder tiles on the front.
    pub fn empty_slots(&self) -> usize {
        TEAM_SIZE.saturating_sub(self.team.len())
    }

    /// Serializes the model to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serializes the model to a pretty-printed JSON string.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserializes a model from JSON.
    ///
    /// A team longer than six entries is cut to six, and `nextSlot` is moved
    /// past every slot id already present. When slot ids repeat, or the
    /// counter has no room left, the team is renumbered in order.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut model: Self = serde_json::from_str(json)?;
        model.team.truncate(TEAM_SIZE);

        let mut seen = HashSet::new();
        let unique = model.team.iter().all(|p| seen.insert(p.slot_id));
        let max_slot = model
            .team
            .iter()
            .map(|p| p.slot_id.0.saturating_add(1))
            .max()
            .unwrap_or(0);
        let next_slot = model.next_slot.max(max_slot);

        if unique && next_slot < u64::MAX {
            model.next_slot = next_slot;
        } else {
            for (i, pick) in model.team.iter_mut().enumerate() {
                pick.slot_id = SlotId(i as u64);
            }
            model.next_slot = model.team.len() as u64;
        }
        Ok(model)
    }
}

// ============================================================================
// Actions
// ============================================================================

/// A user action against the card.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SetTrainerName(String),
    SelectAvatar(TrainerAvatar),
    SetBackgroundColor(String),
    SetPattern(PatternKind),
    SetPatternWeightEnabled(bool),
    SetPatternScale(f32),
    AddPokemon(PokemonEntry),
    RemovePokemon(SlotId),
    SetCardBackEnabled(bool),
    SetFavoritePokemon(String),
    SetFavoriteType(String),
    SetFavoriteGame(String),
}

/// Result of applying an [`Action`].
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub model: CardModel,
    /// Replacement for the status line, if the action sets one.
    pub status: Option<String>,
    /// A transient notification to show, if any.
    pub toast: Option<String>,
    /// True when the action was refused and `model` is unchanged.
    pub rejected: bool,
}

impl Transition {
    fn unchanged(model: &CardModel) -> Self {
        Self {
            model: model.clone(),
            status: None,
            toast: None,
            rejected: false,
        }
    }

    fn rejected(model: &CardModel, status: impl Into<String>) -> Self {
        Self {
            model: model.clone(),
            status: Some(status.into()),
            toast: None,
            rejected: true,
        }
    }

    fn updated(model: CardModel) -> Self {
        Self {
            model,
            status: None,
            toast: None,
            rejected: false,
        }
    }

    fn with_toast(mut self, toast: impl Into<String>) -> Self {
        self.toast = Some(toast.into());
        self
    }

    fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

/// Applies an action to a model, returning the next snapshot.
///
/// Never mutates `model`. Adding to a full team is refused with a status
/// message; the team is never silently truncated.
pub fn reduce(model: &CardModel, action: Action) -> Transition {
    let mut next = model.clone();
    match action {
        Action::SetTrainerName(name) => {
            next.trainer_name = name;
            Transition::updated(next)
        }
        Action::SelectAvatar(avatar) => {
            let toast = format!("{} added to the front!", avatar.name);
            next.avatar = avatar;
            Transition::updated(next).with_toast(toast)
        }
        Action::SetBackgroundColor(hex) => {
            next.background_color = hex;
            Transition::updated(next)
        }
        Action::SetPattern(kind) => {
            next.pattern = kind;
            Transition::updated(next)
        }
        Action::SetPatternWeightEnabled(enabled) => {
            next.pattern_weight_enabled = enabled;
            Transition::updated(next)
        }
        Action::SetPatternScale(scale) => {
            if !scale.is_finite() || scale <= 0.0 {
                return Transition::unchanged(model);
            }
            next.pattern_scale = scale;
            Transition::updated(next)
        }
        Action::AddPokemon(entry) => {
            if model.is_team_full() {
                return Transition::rejected(model, TEAM_FULL_MESSAGE);
            }
            let slot = SlotId(next.next_slot);
            next.next_slot += 1;
            let status = format!("{} added to your party!", entry.name);
            let toast = format!("{} added to the front!", entry.name);
            next.team.push(PokemonPick::from_entry(slot, entry));
            Transition::updated(next).with_status(status).with_toast(toast)
        }
        Action::RemovePokemon(slot) => {
            next.team.retain(|p| p.slot_id != slot);
            Transition::updated(next)
        }
        Action::SetCardBackEnabled(enabled) => {
            next.card_back_enabled = enabled;
            Transition::updated(next)
        }
        Action::SetFavoritePokemon(value) => {
            let normalized = value.trim().to_lowercase();
            let toast = saved_toast(&model.bio.favorite_pokemon, &normalized, capitalize);
            next.bio.favorite_pokemon = normalized;
            with_optional_toast(Transition::updated(next), toast)
        }
        Action::SetFavoriteType(value) => {
            let trimmed = value.trim().to_string();
            let toast = saved_toast(&model.bio.favorite_type, &trimmed, str::to_string);
            next.bio.favorite_type = trimmed;
            with_optional_toast(Transition::updated(next), toast)
        }
        Action::SetFavoriteGame(value) => {
            let trimmed = value.trim().to_string();
            let toast = saved_toast(&model.bio.favorite_game, &trimmed, str::to_string);
            next.bio.favorite_game = trimmed;
            with_optional_toast(Transition::updated(next), toast)
        }
    }
}

fn saved_toast(previous: &str, value: &str, display: impl Fn(&str) -> String) -> Option<String> {
    (!value.is_empty() && value != previous).then(|| format!("{} saved to the back!", display(value)))
}

fn with_optional_toast(transition: Transition, toast: Option<String>) -> Transition {
    match toast {
        Some(toast) => transition.with_toast(toast),
        None => transition,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u32, name: &str) -> PokemonEntry {
        PokemonEntry {
            id,
            name: name.to_string(),
            sprite: format!("https://sprites.invalid/{id}.png"),
            types: vec!["Normal".to_string()],
        }
    }

    fn with_team(names: &[&str]) -> CardModel {
        names.iter().enumerate().fold(CardModel::default(), |model, (i, name)| {
            reduce(&model, Action::AddPokemon(entry(i as u32 + 1, name))).model
        })
    }

    #[test]
    fn blank_name_falls_back() {
        let mut model = CardModel::default();
        model.trainer_name = "   ".into();
        assert_eq!(model.display_name(), "Trainer");
        model.trainer_name = "  Misty ".into();
        assert_eq!(model.display_name(), "Misty");
    }

    #[test]
    fn add_assigns_unique_slots() {
        let model = with_team(&["Pikachu", "Charizard", "Gengar"]);
        let ids: HashSet<_> = model.team.iter().map(|p| p.slot_id).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(model.empty_slots(), 3);
    }

    #[test]
    fn seventh_pokemon_is_rejected() {
        let full = with_team(&["A", "B", "C", "D", "E", "F"]);
        assert!(full.is_team_full());

        let t = reduce(&full, Action::AddPokemon(entry(7, "G")));
        assert!(t.rejected);
        assert_eq!(t.model, full);
        assert_eq!(t.status.as_deref(), Some(TEAM_FULL_MESSAGE));
        assert!(t.toast.is_none());
    }

    #[test]
    fn remove_keeps_relative_order() {
        let model = with_team(&["Pikachu", "Charizard", "Gengar", "Lucario"]);
        let target = model.team[1].slot_id;

        let t = reduce(&model, Action::RemovePokemon(target));
        let names: Vec<_> = t.model.team.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Pikachu", "Gengar", "Lucario"]);
    }

    #[test]
    fn remove_after_readd_uses_fresh_ids() {
        let model = with_team(&["Pikachu", "Pikachu"]);
        let first = model.team[0].slot_id;
        let model = reduce(&model, Action::RemovePokemon(first)).model;
        let model = reduce(&model, Action::AddPokemon(entry(25, "Pikachu"))).model;

        assert_eq!(model.team.len(), 2);
        assert!(model.team.iter().all(|p| p.slot_id != first));
        assert_ne!(model.team[0].slot_id, model.team[1].slot_id);
    }

    #[test]
    fn remove_unknown_slot_is_noop() {
        let model = with_team(&["Pikachu"]);
        let t = reduce(&model, Action::RemovePokemon(SlotId(99)));
        assert_eq!(t.model.team, model.team);
    }

    #[test]
    fn scale_ignored_without_weighting() {
        let model = reduce(&CardModel::default(), Action::SetPatternScale(2.5)).model;
        assert_eq!(model.pattern_scale, 2.5);
        assert_eq!(model.effective_pattern_scale(), 1.0);

        let model = reduce(&model, Action::SetPatternWeightEnabled(true)).model;
        assert_eq!(model.effective_pattern_scale(), 2.5);
    }

    #[test]
    fn invalid_scale_is_ignored() {
        let model = CardModel::default();
        assert_eq!(reduce(&model, Action::SetPatternScale(0.0)).model, model);
        assert_eq!(reduce(&model, Action::SetPatternScale(f32::NAN)).model, model);
    }

    #[test]
    fn descriptor_uses_effective_scale() {
        let mut model = CardModel::default();
        model.pattern = PatternKind::Grid;
        model.pattern_scale = 2.0;
        assert_eq!(model.pattern_descriptor().tile_size(), Some((30.0, 30.0)));
        model.pattern_weight_enabled = true;
        assert_eq!(model.pattern_descriptor().tile_size(), Some((60.0, 60.0)));
    }

    #[test]
    fn favorite_pokemon_is_normalized() {
        let t = reduce(&CardModel::default(), Action::SetFavoritePokemon("  Starmie ".into()));
        assert_eq!(t.model.bio.favorite_pokemon, "starmie");
        assert_eq!(t.toast.as_deref(), Some("Starmie saved to the back!"));

        let again = reduce(&t.model, Action::SetFavoritePokemon("starmie".into()));
        assert!(again.toast.is_none());
    }

    #[test]
    fn clearing_bio_has_no_toast() {
        let model = reduce(&CardModel::default(), Action::SetFavoriteGame("Emerald".into())).model;
        let t = reduce(&model, Action::SetFavoriteGame("  ".into()));
        assert_eq!(t.model.bio.favorite_game, "");
        assert!(t.toast.is_none());
    }

    #[test]
    fn avatar_selection_toasts() {
        let avatar = default_avatars()[1].clone();
        let t = reduce(&CardModel::default(), Action::SelectAvatar(avatar.clone()));
        assert_eq!(t.model.avatar, avatar);
        assert_eq!(t.toast, Some(format!("{} added to the front!", avatar.name)));
    }

    #[test]
    fn json_roundtrip_preserves_slots() {
        let model = with_team(&["Pikachu", "Charizard"]);
        let json = model.to_json().unwrap();
        assert!(json.contains("\"trainerName\""));
        assert!(json.contains("\"slotId\""));

        let restored = CardModel::from_json(&json).unwrap();
        assert_eq!(restored, model);
    }

    #[test]
    fn from_json_repairs_counters_and_length() {
        let picks: Vec<String> = (0..8)
            .map(|i| format!(r#"{{"slotId":{i},"id":{i},"name":"P{i}","sprite":"s"}}"#))
            .collect();
        let json = format!(r#"{{"team":[{}]}}"#, picks.join(","));

        let model = CardModel::from_json(&json).unwrap();
        assert_eq!(model.team.len(), TEAM_SIZE);
        assert_eq!(model.next_slot, 6);
        assert_eq!(model.trainer_name, "Trainer");
        assert!(model.card_back_enabled);
    }

    #[test]
    fn from_json_renumbers_repeated_slots() {
        let json = r#"{"team":[
            {"slotId":1,"id":25,"name":"Pikachu","sprite":"s"},
            {"slotId":1,"id":6,"name":"Charizard","sprite":"s"}
        ]}"#;
        let model = CardModel::from_json(json).unwrap();
        let ids: Vec<_> = model.team.iter().map(|p| p.slot_id).collect();
        assert_eq!(ids, [SlotId(0), SlotId(1)]);
        assert_eq!(model.next_slot, 2);

        let next = reduce(&model, Action::RemovePokemon(SlotId(1))).model;
        assert_eq!(next.team.len(), 1);
        assert_eq!(next.team[0].name, "Pikachu");
    }

    #[test]
    fn from_json_survives_exhausted_slot_counter() {
        let json = r#"{"team":[{"slotId":18446744073709551615,"id":25,"name":"Pikachu","sprite":"s"}]}"#;
        let model = CardModel::from_json(json).unwrap();
        assert_eq!(model.team[0].slot_id, SlotId(0));
        assert_eq!(model.next_slot, 1);

        let json = r#"{"nextSlot":18446744073709551615}"#;
        assert_eq!(CardModel::from_json(json).unwrap().next_slot, 0);
    }

    #[test]
    fn from_json_keeps_sparse_unique_slots() {
        let json = r#"{"nextSlot":4,"team":[
            {"slotId":1,"id":25,"name":"Pikachu","sprite":"s"},
            {"slotId":3,"id":6,"name":"Charizard","sprite":"s"}
        ]}"#;
        let model = CardModel::from_json(json).unwrap();
        assert_eq!(model.team[1].slot_id, SlotId(3));
        assert_eq!(model.next_slot, 4);
    }

    #[test]
    fn unknown_pattern_loads_as_none() {
        let model = CardModel::from_json(r##"{"pattern":"plaid","backgroundColor":"#1976d2"}"##).unwrap();
        assert_eq!(model.pattern, PatternKind::None);
        assert!(model.pattern_descriptor().is_empty());

        let model = CardModel::from_json(r#"{"pattern":"circles"}"#).unwrap();
        assert_eq!(model.pattern, PatternKind::Dots);
    }

    #[test]
    fn empty_json_is_default_card() {
        assert_eq!(CardModel::from_json("{}").unwrap(), CardModel::default());
    }
}
