// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Learner profile: storage row, canonical cached view, and partial updates.
//!
//! The profiles table still carries two legacy columns that mirror canonical
//! ones:
//! - `money` mirrors `total_coins`
//! - `total_correct_answers` mirrors `total_correct`
//!
//! Only [`ProfileRow`] and [`ProfilePatch`] know about the legacy columns.
//! Reads prefer the canonical column and fall back to the legacy one; every
//! write of a canonical value also writes its mirror.

use crate::models::chapter::FALLBACK_CHAPTER_ID;
use crate::models::identity::Identity;
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Name shown when neither `name` nor `full_name` is known.
pub const DEFAULT_DISPLAY_NAME: &str = "Student";
/// Class level assigned to profiles created without one.
pub const DEFAULT_CLASS_LEVEL: i32 = 1;
/// Coin balance assumed when a row has no balance at all.
pub const STARTING_COINS: i64 = 100;
/// Avatar selector for new profiles.
pub const DEFAULT_AVATAR: i32 = 1;

/// A row of the profiles table, exactly as stored.
///
/// Every column except `id` may be null on read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileRow {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_level: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_coins: Option<i64>,
    /// Legacy mirror of `total_coins`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub money: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_correct: Option<i64>,
    /// Legacy mirror of `total_correct`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_correct_answers: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_wrong: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlocked_chapters: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic_completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl ProfileRow {
    /// Row created when a signed-in identity has no profile yet.
    ///
    /// Starts at class 1 with the default coin balance. `first_chapter` is the
    /// catalog's first chapter for class 1; the fallback chapter is used when
    /// the catalog has none.
    pub fn self_healed(identity: &Identity, first_chapter: Option<&str>) -> Self {
        let meta = &identity.user_metadata;
        let name = meta
            .name
            .clone()
            .or_else(|| meta.full_name.clone())
            .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string());

        Self {
            id: identity.id.clone(),
            email: identity.email.clone(),
            name: Some(name),
            full_name: None,
            class_level: Some(DEFAULT_CLASS_LEVEL),
            total_coins: Some(STARTING_COINS),
            money: Some(STARTING_COINS),
            total_correct: Some(0),
            total_correct_answers: Some(0),
            total_wrong: Some(0),
            avatar: Some(DEFAULT_AVATAR),
            unlocked_chapters: Some(vec![first_chapter
                .unwrap_or(FALLBACK_CHAPTER_ID)
                .to_string()]),
            diagnostic_completed: Some(false),
            phone: None,
        }
    }

    /// Row inserted by an explicit sign-up.
    ///
    /// Balance starts at 0 while the legacy `money` column starts at 100.
    /// Chapters are empty when the catalog has no first chapter for the class.
    pub fn signed_up(
        id: &str,
        email: &str,
        name: &str,
        class_level: i32,
        first_chapter: Option<&str>,
    ) -> Self {
        Self {
            id: id.to_string(),
            email: Some(email.to_string()),
            name: Some(name.to_string()),
            full_name: None,
            class_level: Some(class_level),
            total_coins: Some(0),
            money: Some(STARTING_COINS),
            total_correct: Some(0),
            total_correct_answers: Some(0),
            total_wrong: Some(0),
            avatar: Some(DEFAULT_AVATAR),
            unlocked_chapters: Some(first_chapter.map(str::to_string).into_iter().collect()),
            diagnostic_completed: Some(false),
            phone: None,
        }
    }

    /// Canonical coin balance: `total_coins`, else legacy `money`, else the default.
    pub fn coin_balance(&self) -> i64 {
        self.total_coins.or(self.money).unwrap_or(STARTING_COINS)
    }

    /// Whether the canonical balance column is null and must be backfilled.
    pub fn needs_coin_backfill(&self) -> bool {
        self.total_coins.is_none()
    }

    /// Apply a partial update in place (only set columns are touched).
    ///
    /// An explicit null in the patch clears a nullable column.
    pub fn apply(&mut self, patch: &ProfilePatch) {
        fn set<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
            if let Some(v) = src {
                *dst = Some(v.clone());
            }
        }

        fn set_nullable<T: Clone>(dst: &mut Option<T>, src: &Option<Option<T>>) {
            if let Some(v) = src {
                *dst = v.clone();
            }
        }

        set_nullable(&mut self.email, &patch.email);
        set_nullable(&mut self.name, &patch.name);
        set_nullable(&mut self.full_name, &patch.full_name);
        set(&mut self.class_level, &patch.class_level);
        set(&mut self.total_coins, &patch.total_coins);
        set(&mut self.money, &patch.money);
        set(&mut self.total_correct, &patch.total_correct);
        set(&mut self.total_correct_answers, &patch.total_correct_answers);
        set(&mut self.total_wrong, &patch.total_wrong);
        set(&mut self.avatar, &patch.avatar);
        set(&mut self.unlocked_chapters, &patch.unlocked_chapters);
        set(&mut self.diagnostic_completed, &patch.diagnostic_completed);
        set_nullable(&mut self.phone, &patch.phone);
    }
}

/// Partial update of a profile row. Unset columns are left untouched.
///
/// Nullable text columns are `Option<Option<_>>`: `None` leaves the column
/// alone, `Some(None)` writes null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub email: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub name: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub full_name: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_level: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_coins: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub money: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_correct: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_correct_answers: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_wrong: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlocked_chapters: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic_completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub phone: Option<Option<String>>,
}

impl ProfilePatch {
    /// Backfill of a null balance column (both currency columns).
    pub fn coin_backfill(coins: i64) -> Self {
        Self {
            total_coins: Some(coins),
            money: Some(coins),
            ..Default::default()
        }
    }

    /// Write of new cumulative totals, mirrored into the legacy columns.
    pub fn stats(totals: &StatsTotals) -> Self {
        Self {
            total_coins: Some(totals.total_coins),
            money: Some(totals.total_coins),
            total_correct: Some(totals.total_correct),
            total_correct_answers: Some(totals.total_correct),
            total_wrong: Some(totals.total_wrong),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl From<&ProfileRow> for ProfilePatch {
    /// Every non-null column of `row` except the key.
    fn from(row: &ProfileRow) -> Self {
        Self {
            email: row.email.clone().map(Some),
            name: row.name.clone().map(Some),
            full_name: row.full_name.clone().map(Some),
            class_level: row.class_level,
            total_coins: row.total_coins,
            money: row.money,
            total_correct: row.total_correct,
            total_correct_answers: row.total_correct_answers,
            total_wrong: row.total_wrong,
            avatar: row.avatar,
            unlocked_chapters: row.unlocked_chapters.clone(),
            diagnostic_completed: row.diagnostic_completed,
            phone: row.phone.clone().map(Some),
        }
    }
}

/// Deserialize a present field as `Some`, so an explicit null becomes
/// `Some(None)` while a missing field stays `None` (via `default`).
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Canonical profile held by the session manager.
///
/// Legacy columns are folded into their canonical field when the row is read.
/// Name and chapter fallbacks are views ([`Profile::display_name`],
/// [`Profile::effective_chapters`]); the stored values are kept as fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Profile {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub full_name: Option<String>,
    pub class_level: i32,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total_coins: i64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total_correct: i64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total_wrong: i64,
    pub avatar: i32,
    pub unlocked_chapters: Vec<String>,
    pub diagnostic_completed: bool,
    pub phone: Option<String>,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        let total_coins = row.coin_balance();
        Self {
            id: row.id,
            email: row.email,
            name: row.name,
            full_name: row.full_name,
            class_level: row.class_level.unwrap_or(DEFAULT_CLASS_LEVEL),
            total_coins,
            total_correct: row
                .total_correct
                .or(row.total_correct_answers)
                .unwrap_or(0),
            total_wrong: row.total_wrong.unwrap_or(0),
            avatar: row.avatar.unwrap_or(DEFAULT_AVATAR),
            unlocked_chapters: row.unlocked_chapters.unwrap_or_default(),
            diagnostic_completed: row.diagnostic_completed.unwrap_or(false),
            phone: row.phone,
        }
    }
}

impl Profile {
    /// `name`, else `full_name`, else "Student".
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.full_name.as_deref())
            .unwrap_or(DEFAULT_DISPLAY_NAME)
    }

    /// Unlocked chapters, never empty.
    pub fn effective_chapters(&self) -> Vec<String> {
        if self.unlocked_chapters.is_empty() {
            vec![FALLBACK_CHAPTER_ID.to_string()]
        } else {
            self.unlocked_chapters.clone()
        }
    }

    /// Copy of this profile with new stat totals.
    pub fn with_totals(&self, totals: &StatsTotals) -> Self {
        Self {
            total_coins: totals.total_coins,
            total_correct: totals.total_correct,
            total_wrong: totals.total_wrong,
            ..self.clone()
        }
    }
}

/// Increment applied by a stats update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsDelta {
    pub correct: i64,
    pub wrong: i64,
    /// Coin change; may be fractional, the new balance is floored
    pub coins: f64,
}

/// Cumulative totals after a stats update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsTotals {
    pub total_correct: i64,
    pub total_wrong: i64,
    pub total_coins: i64,
}

impl StatsTotals {
    /// Add `delta` to the totals of `current` (zeros when there is no profile).
    pub fn accumulate(current: Option<&Profile>, delta: StatsDelta) -> Self {
        let (correct, wrong, coins) = current
            .map(|p| (p.total_correct, p.total_wrong, p.total_coins))
            .unwrap_or((0, 0, 0));

        Self {
            total_correct: correct + delta.correct,
            total_wrong: wrong + delta.wrong,
            total_coins: (coins as f64 + delta.coins).floor() as i64,
        }
    }
}

/// Caller-facing partial profile update.
///
/// Coin and correct-count fields are mirrored into their legacy columns when
/// converted to a [`ProfilePatch`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub email: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub name: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub full_name: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_level: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_coins: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_correct: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_wrong: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlocked_chapters: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic_completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub phone: Option<Option<String>>,
}

impl From<ProfileUpdate> for ProfilePatch {
    fn from(update: ProfileUpdate) -> Self {
        Self {
            email: update.email,
            name: update.name,
            full_name: update.full_name,
            class_level: update.class_level,
            total_coins: update.total_coins,
            money: update.total_coins,
            total_correct: update.total_correct,
            total_correct_answers: update.total_correct,
            total_wrong: update.total_wrong,
            avatar: update.avatar,
            unlocked_chapters: update.unlocked_chapters,
            diagnostic_completed: update.diagnostic_completed,
            phone: update.phone,
        }
    }
}
