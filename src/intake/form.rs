use serde::{Deserialize, Serialize};

use crate::emotion::AggregatedEmotion;
use crate::error::FormError;

/// Patient details collected alongside the camera feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeForm {
    pub name: String,
    pub age: String,
    pub sex: String,
    pub location: String,
    pub email: String,
    pub consent: bool,
    /// Emotion label stamped in when the form is submitted.
    pub emotion: String,
}

impl Default for IntakeForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            age: String::new(),
            sex: String::new(),
            location: String::new(),
            email: String::new(),
            consent: false,
            emotion: AggregatedEmotion::DEFAULT_LABEL.to_string(),
        }
    }
}

impl IntakeForm {
    pub fn validate(&self) -> Result<(), FormError> {
        let required = [
            ("name", &self.name),
            ("age", &self.age),
            ("sex", &self.sex),
            ("location", &self.location),
            ("email", &self.email),
        ];
        if let Some((field, _)) = required.into_iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(FormError::MissingField(field));
        }

        if self.age.trim().parse::<u8>().is_err() {
            return Err(FormError::InvalidAge(self.age.clone()));
        }

        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => return Err(FormError::InvalidEmail(self.email.clone())),
        }

        if !self.consent {
            return Err(FormError::ConsentRequired);
        }
        Ok(())
    }

    /// Validates and returns the submitted form with `emotion` set to the given reading.
    pub fn submit(mut self, emotion: &AggregatedEmotion) -> Result<Self, FormError> {
        self.validate()?;
        self.emotion = emotion.label.clone();
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled() -> IntakeForm {
        IntakeForm {
            name: "Ada".to_string(),
            age: "34".to_string(),
            sex: "female".to_string(),
            location: "Lisbon".to_string(),
            email: "ada@example.com".to_string(),
            consent: true,
            ..IntakeForm::default()
        }
    }

    #[test]
    fn new_form_starts_normal() {
        let form = IntakeForm::default();
        assert_eq!(form.emotion, "Normal");
        assert!(!form.consent);
    }

    #[test]
    fn missing_fields_are_named_in_order() {
        assert_eq!(
            IntakeForm::default().validate(),
            Err(FormError::MissingField("name"))
        );
        let form = IntakeForm {
            location: "  ".to_string(),
            ..filled()
        };
        assert_eq!(form.validate(), Err(FormError::MissingField("location")));
    }

    #[test]
    fn age_and_email_are_checked() {
        let form = IntakeForm {
            age: "thirty".to_string(),
            ..filled()
        };
        assert_eq!(
            form.validate(),
            Err(FormError::InvalidAge("thirty".to_string()))
        );

        let form = IntakeForm {
            email: "ada.example.com".to_string(),
            ..filled()
        };
        assert!(matches!(form.validate(), Err(FormError::InvalidEmail(_))));
    }

    #[test]
    fn consent_is_required() {
        let form = IntakeForm {
            consent: false,
            ..filled()
        };
        assert_eq!(form.validate(), Err(FormError::ConsentRequired));
    }

    #[test]
    fn submit_stamps_the_emotion() {
        let emotion = AggregatedEmotion {
            label: "sad".to_string(),
            confidence: 0.7,
        };
        let submitted = filled().submit(&emotion).unwrap();
        assert_eq!(submitted.emotion, "sad");
    }
}
