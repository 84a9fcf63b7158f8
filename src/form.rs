use std::collections::BTreeMap;
use std::fmt;

use crate::gateway::RemoteGateway;
use crate::model::{Age, ProfileRow};
use crate::Result;

/// Required inputs of the profile screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Photo,
    FullName,
    WorkAs,
    LookingFor,
    FamilyPlan,
    Relationship,
    ContactPreference,
    Tagline,
    Interests,
}

impl Field {
    pub fn message(&self) -> &'static str {
        match self {
            Field::Photo => "Photo is required",
            Field::FullName => "Name required",
            Field::WorkAs => "Work As required",
            Field::LookingFor => "Looking For required",
            Field::FamilyPlan => "Family Plan required",
            Field::Relationship => "Relationship Status required",
            Field::ContactPreference => "Texting/Calling preference required",
            Field::Tagline => "Tagline required",
            Field::Interests => "Select at least one interest",
        }
    }
}

/// Missing-field errors of one save attempt, ordered by [`Field`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: BTreeMap<Field, &'static str>,
}

impl ValidationErrors {
    fn add(&mut self, field: Field) {
        self.errors.insert(field, field.message());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn contains(&self, field: Field) -> bool {
        self.errors.contains_key(&field)
    }

    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.errors.keys().copied()
    }

    pub fn messages(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.errors.values().copied()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.messages().collect();
        f.write_str(&messages.join(", "))
    }
}

/// Attribute inputs of the profile screen.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProfileForm {
    pub full_name: String,
    pub work_as: String,
    pub looking_for: String,
    pub family_plan: String,
    pub relationship: String,
    pub contact_preference: String,
    pub tagline: String,
    pub age: Age,
    interests: Vec<String>,
}

impl ProfileForm {
    pub fn interests(&self) -> &[String] {
        &self.interests
    }

    pub fn is_selected(&self, tag: &str) -> bool {
        self.interests.iter().any(|t| t == tag)
    }

    /// Select `tag` if it is not selected yet, deselect it otherwise.
    pub fn toggle_interest(&mut self, tag: &str) {
        if let Some(pos) = self.interests.iter().position(|t| t == tag) {
            self.interests.remove(pos);
        } else {
            self.interests.push(tag.to_owned());
        }
    }

    pub fn set_age(&mut self, age: i64) {
        self.age = Age::new(age);
    }

    /// Check every required input; `has_photo` tells whether a photo is
    /// currently displayed.
    pub fn validate(&self, has_photo: bool) -> ValidationErrors {
        let mut errors = ValidationErrors::default();
        if !has_photo {
            errors.add(Field::Photo);
        }

        let texts = [
            (Field::FullName, &self.full_name),
            (Field::WorkAs, &self.work_as),
            (Field::LookingFor, &self.looking_for),
            (Field::FamilyPlan, &self.family_plan),
            (Field::Relationship, &self.relationship),
            (Field::ContactPreference, &self.contact_preference),
            (Field::Tagline, &self.tagline),
        ];
        for (field, value) in texts {
            if value.trim().is_empty() {
                errors.add(field);
            }
        }

        if self.interests.is_empty() {
            errors.add(Field::Interests);
        }
        errors
    }

    /// Replace the form content with a stored row.
    pub fn fill_from(&mut self, row: &ProfileRow) {
        let text = |value: &Option<String>| value.clone().unwrap_or_default();
        self.full_name = text(&row.full_name);
        self.work_as = text(&row.work_as);
        self.looking_for = text(&row.looking_for);
        self.family_plan = text(&row.family_plan);
        self.relationship = text(&row.relationship_status);
        self.contact_preference = text(&row.texting_calling);
        self.tagline = text(&row.tagline);
        self.age = row.age.map(Age::new).unwrap_or_default();

        self.interests.clear();
        for tag in row.interests.iter().flatten() {
            if !self.is_selected(tag) {
                self.interests.push(tag.clone());
            }
        }
    }

    /// The row upserted on save, text kept as entered.
    pub fn to_row(&self, user_id: &str) -> ProfileRow {
        ProfileRow {
            id: user_id.to_owned(),
            full_name: Some(self.full_name.clone()),
            work_as: Some(self.work_as.clone()),
            looking_for: Some(self.looking_for.clone()),
            family_plan: Some(self.family_plan.clone()),
            relationship_status: Some(self.relationship.clone()),
            texting_calling: Some(self.contact_preference.clone()),
            age: Some(self.age.get() as i64),
            tagline: Some(self.tagline.clone()),
            interests: Some(self.interests.clone()),
        }
    }
}

/// What the screen already knows about the current user.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExistingProfile {
    pub form: ProfileForm,
    pub photo_url: Option<String>,
}

/// Fetch the profile and photo reference of the signed in user.
///
/// Without a user, or without a stored profile, the defaults are returned.
pub async fn load_existing(
    gateway: &dyn RemoteGateway,
) -> Result<ExistingProfile> {
    let mut existing = ExistingProfile::default();
    let Some(user) = gateway.current_user().await? else {
        return Ok(existing);
    };

    if let Some(row) = gateway.fetch_profile(&user.id).await? {
        existing.form.fill_from(&row);
    }
    if let Some(reference) = gateway.fetch_photo_reference(&user.id).await? {
        if !reference.photo_url.is_empty() {
            existing.photo_url = Some(reference.photo_url);
        }
    }
    Ok(existing)
}
