//! Form Validation
//!
//! Registration and event forms arrive as loosely-typed input; validation
//! collects every offending field and, on success, produces the typed record.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::db::{EventPatch, NewEvent, ProfilePatch};
use crate::error::{ApiError, FieldErrors};
use crate::types::catalog;
use crate::types::{EventStatus, SkillLevel};

const REQUIRED: &str = "This field is required";

pub const MIN_PARTICIPANTS: u32 = 2;
pub const MAX_PARTICIPANTS: u32 = 50;

// ============ Primitive checks ============

/// `local@domain.tld`, 공백 없음
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

/// 공백, 하이픈, 괄호 제거 후 `^\+?[1-9]\d{0,15}$`
pub fn is_valid_phone(phone: &str) -> bool {
    let cleaned: String = phone
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    let digits = cleaned.strip_prefix('+').unwrap_or(&cleaned);

    let mut chars = digits.chars();
    match chars.next() {
        Some('1'..='9') => {}
        _ => return false,
    }
    let rest: Vec<char> = chars.collect();
    rest.len() <= 15 && rest.iter().all(char::is_ascii_digit)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strength {
    Weak,
    Medium,
    Strong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PasswordStrength {
    pub strength: Strength,
    pub score: u8,
}

impl PasswordStrength {
    pub fn message(&self) -> &'static str {
        match self.strength {
            Strength::Weak => "Password is too weak",
            Strength::Medium => "Medium strength password",
            Strength::Strong => "Strong password",
        }
    }
}

const SPECIAL_CHARS: &str = "!@#$%^&*(),.?\":{}|<>";

/// 길이(≥6), 대문자, 소문자, 숫자, 특수문자 각 1점
pub fn password_strength(password: &str) -> PasswordStrength {
    let checks = [
        password.chars().count() >= 6,
        password.chars().any(|c| c.is_ascii_uppercase()),
        password.chars().any(|c| c.is_ascii_lowercase()),
        password.chars().any(|c| c.is_ascii_digit()),
        password.chars().any(|c| SPECIAL_CHARS.contains(c)),
    ];
    let score = checks.iter().filter(|passed| **passed).count() as u8;

    let strength = match score {
        4.. => Strength::Strong,
        2..=3 => Strength::Medium,
        _ => Strength::Weak,
    };

    PasswordStrength { strength, score }
}

// ============ Registration ============

/// 회원가입 입력
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistrationForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub confirm_password: Option<String>,
    pub city: String,
    pub area: String,
}

fn check_name(errors: &mut FieldErrors, field: &str, value: &str) {
    let value = value.trim();
    if value.is_empty() {
        errors.insert(field.to_string(), REQUIRED.to_string());
    } else if value.chars().count() < 2 {
        errors.insert(field.to_string(), "Must be at least 2 characters".to_string());
    }
}

fn check_location(errors: &mut FieldErrors, city: &str, area: &str) {
    if city.is_empty() {
        errors.insert("city".to_string(), REQUIRED.to_string());
    } else if catalog::city_by_id(city).is_none() {
        errors.insert("city".to_string(), "Unknown city".to_string());
    }
    if area.is_empty() {
        errors.insert("area".to_string(), REQUIRED.to_string());
    } else if !city.is_empty() && !catalog::area_in_city(city, area) {
        errors.insert("area".to_string(), "Area does not belong to the selected city".to_string());
    }
}

pub fn validate_registration(form: &RegistrationForm) -> Result<(), ApiError> {
    let mut errors = FieldErrors::new();

    check_name(&mut errors, "firstName", &form.first_name);
    check_name(&mut errors, "lastName", &form.last_name);

    let email = form.email.trim();
    if email.is_empty() {
        errors.insert("email".into(), "Email is required".into());
    } else if !is_valid_email(email) {
        errors.insert("email".into(), "Please enter a valid email address".into());
    }

    let phone = form.phone.trim();
    if phone.is_empty() {
        errors.insert("phone".into(), "Phone number is required".into());
    } else if !is_valid_phone(phone) {
        errors.insert("phone".into(), "Please enter a valid phone number".into());
    }

    if form.password.is_empty() {
        errors.insert("password".into(), "Password is required".into());
    } else if form.password.chars().count() < 6 {
        errors.insert("password".into(), "Password must be at least 6 characters".into());
    } else {
        let strength = password_strength(&form.password);
        if strength.strength == Strength::Weak {
            errors.insert("password".into(), strength.message().into());
        }
    }

    if let Some(confirm) = &form.confirm_password {
        if confirm.is_empty() {
            errors.insert("confirmPassword".into(), "Please confirm your password".into());
        } else if *confirm != form.password {
            errors.insert("confirmPassword".into(), "Passwords do not match".into());
        }
    }

    check_location(&mut errors, form.city.trim(), form.area.trim());

    finish(errors)
}

/// 프로필 수정 검증: 들어온 필드만 검사
pub fn validate_profile_patch(patch: &ProfilePatch, current_city: &str) -> Result<(), ApiError> {
    let mut errors = FieldErrors::new();

    if let Some(first_name) = &patch.first_name {
        check_name(&mut errors, "firstName", first_name);
    }
    if let Some(last_name) = &patch.last_name {
        check_name(&mut errors, "lastName", last_name);
    }
    if let Some(phone) = &patch.phone {
        if !is_valid_phone(phone.trim()) {
            errors.insert("phone".into(), "Please enter a valid phone number".into());
        }
    }
    if patch.city.is_some() || patch.area.is_some() {
        let city = patch.city.as_deref().unwrap_or(current_city);
        match patch.area.as_deref() {
            Some(area) => check_location(&mut errors, city, area),
            None => {
                errors.insert("area".into(), "Select an area for the new city".into());
            }
        }
    }

    finish(errors)
}

// ============ Events ============

/// 이벤트 생성 입력 (검증 전)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventForm {
    pub title: String,
    pub sport: String,
    pub description: String,
    pub date: String,
    pub time: String,
    pub city: String,
    pub area: String,
    pub skill_level: String,
    pub max_participants: Option<u32>,
}

/// 이벤트 수정 입력 (검증 전, 모든 필드 선택)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventPatchForm {
    pub title: Option<String>,
    pub sport: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub city: Option<String>,
    pub area: Option<String>,
    pub skill_level: Option<String>,
    pub max_participants: Option<u32>,
    pub status: Option<String>,
    pub is_active: Option<bool>,
}

fn required_text(errors: &mut FieldErrors, field: &str, value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        errors.insert(field.to_string(), REQUIRED.to_string());
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_date(errors: &mut FieldErrors, value: &str, today: NaiveDate) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        errors.insert("date".into(), REQUIRED.into());
        return None;
    }
    match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        Ok(date) if date < today => {
            errors.insert("date".into(), "Event date cannot be in the past".into());
            None
        }
        Ok(date) => Some(date),
        Err(_) => {
            errors.insert("date".into(), "Use the YYYY-MM-DD format".into());
            None
        }
    }
}

fn parse_time(errors: &mut FieldErrors, value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    if value.is_empty() {
        errors.insert("time".into(), REQUIRED.into());
        return None;
    }
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| errors.insert("time".into(), "Use the HH:MM format".into()))
        .ok()
}

fn parse_skill_level(errors: &mut FieldErrors, value: &str) -> Option<SkillLevel> {
    let value = value.trim();
    if value.is_empty() {
        errors.insert("skillLevel".into(), REQUIRED.into());
        return None;
    }
    value
        .parse()
        .map_err(|_| errors.insert("skillLevel".into(), "Unknown skill level".into()))
        .ok()
}

fn check_sport(errors: &mut FieldErrors, sport: &str) {
    if catalog::sport_by_id(sport).is_none() {
        errors.insert("sport".into(), "Unknown sport".into());
    }
}

fn check_capacity(errors: &mut FieldErrors, max: Option<u32>) -> Option<u32> {
    match max {
        Some(max) if (MIN_PARTICIPANTS..=MAX_PARTICIPANTS).contains(&max) => Some(max),
        _ => {
            errors.insert(
                "maxParticipants".into(),
                format!("Participants must be between {MIN_PARTICIPANTS} and {MAX_PARTICIPANTS}"),
            );
            None
        }
    }
}

/// 이벤트 생성 폼 검증
///
/// `today`보다 이전 날짜는 거부
pub fn validate_event_form(form: &EventForm, today: NaiveDate) -> Result<NewEvent, ApiError> {
    let mut errors = FieldErrors::new();

    let title = required_text(&mut errors, "title", &form.title);
    let sport = required_text(&mut errors, "sport", &form.sport);
    let description = required_text(&mut errors, "description", &form.description);
    let date = parse_date(&mut errors, &form.date, today);
    let time = parse_time(&mut errors, &form.time);
    let city = required_text(&mut errors, "city", &form.city);
    let area = required_text(&mut errors, "area", &form.area);
    let skill_level = parse_skill_level(&mut errors, &form.skill_level);
    let max_participants = check_capacity(&mut errors, form.max_participants);

    if let Some(sport) = &sport {
        check_sport(&mut errors, sport);
    }
    if let (Some(city), Some(area)) = (&city, &area) {
        check_location(&mut errors, city, area);
    }

    match (title, sport, description, date, time, city, area, skill_level, max_participants) {
        (
            Some(title),
            Some(sport),
            Some(description),
            Some(date),
            Some(time),
            Some(city),
            Some(area),
            Some(skill_level),
            Some(max_participants),
        ) if errors.is_empty() => Ok(NewEvent {
            title,
            sport,
            description,
            date,
            time,
            city,
            area,
            skill_level,
            max_participants,
        }),
        _ => Err(ApiError::ValidationError(errors)),
    }
}

/// 이벤트 수정 폼 검증
///
/// 도시/지역 조합은 수정 후 값 기준으로 검사 (`current_city`, `current_area`).
/// 정원은 현재 참가자 수 미만으로 줄일 수 없음.
pub fn validate_event_patch(
    form: &EventPatchForm,
    today: NaiveDate,
    current_city: &str,
    current_area: &str,
    participant_count: u32,
) -> Result<EventPatch, ApiError> {
    let mut errors = FieldErrors::new();
    let mut patch = EventPatch::default();

    if let Some(title) = &form.title {
        patch.title = required_text(&mut errors, "title", title);
    }
    if let Some(sport) = &form.sport {
        patch.sport = required_text(&mut errors, "sport", sport);
        if let Some(sport) = &patch.sport {
            check_sport(&mut errors, sport);
        }
    }
    if let Some(description) = &form.description {
        patch.description = required_text(&mut errors, "description", description);
    }
    if let Some(date) = &form.date {
        patch.date = parse_date(&mut errors, date, today);
    }
    if let Some(time) = &form.time {
        patch.time = parse_time(&mut errors, time);
    }
    if form.city.is_some() || form.area.is_some() {
        let city = form.city.as_deref().map(str::trim).unwrap_or(current_city);
        let area = form.area.as_deref().map(str::trim).unwrap_or(current_area);
        check_location(&mut errors, city, area);
        patch.city = form.city.as_ref().map(|c| c.trim().to_string());
        patch.area = form.area.as_ref().map(|a| a.trim().to_string());
    }
    if let Some(level) = &form.skill_level {
        patch.skill_level = parse_skill_level(&mut errors, level);
    }
    if form.max_participants.is_some() {
        patch.max_participants = check_capacity(&mut errors, form.max_participants);
        if let Some(max) = patch.max_participants {
            if max < participant_count {
                errors.insert(
                    "maxParticipants".into(),
                    format!("Event already has {participant_count} participants"),
                );
            }
        }
    }
    if let Some(status) = &form.status {
        patch.status = status
            .trim()
            .parse::<EventStatus>()
            .map_err(|_| errors.insert("status".into(), "Unknown event status".into()))
            .ok();
    }
    patch.is_active = form.is_active;

    if patch.is_empty() && errors.is_empty() {
        return Err(ApiError::BadRequest("Nothing to update".to_string()));
    }

    finish(errors).map(|()| patch)
}

fn finish(errors: FieldErrors) -> Result<(), ApiError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::ValidationError(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 6, 1).unwrap()
    }

    fn event_form() -> EventForm {
        EventForm {
            title: "Sunday football".into(),
            sport: "football".into(),
            description: "Friendly five a side".into(),
            date: "2030-06-02".into(),
            time: "18:30".into(),
            city: "london".into(),
            area: "central-london".into(),
            skill_level: "beginner".into(),
            max_participants: Some(10),
        }
    }

    fn field_errors(err: ApiError) -> FieldErrors {
        match err {
            ApiError::ValidationError(errors) => errors,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_email() {
        assert!(is_valid_email("ana@example.com"));
        assert!(!is_valid_email("ana@example"));
        assert!(!is_valid_email("ana example@x.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("a@b@c.com"));
    }

    #[test]
    fn test_phone() {
        assert!(is_valid_phone("+44 20 7946-0958"));
        assert!(is_valid_phone("(555) 123-4567"));
        assert!(!is_valid_phone("0123"));
        assert!(!is_valid_phone("+1234567890123456789"));
        assert!(!is_valid_phone("phone"));
    }

    #[test]
    fn test_password_strength() {
        assert_eq!(password_strength("abc").strength, Strength::Weak);
        assert_eq!(password_strength("abcdef").strength, Strength::Medium);
        assert_eq!(password_strength("Abcdef1").strength, Strength::Strong);
        assert_eq!(password_strength("Abcdef1!").score, 5);
        assert_eq!(password_strength("Abcdef1").message(), "Strong password");
    }

    #[test]
    fn test_registration_collects_all_errors() {
        let form = RegistrationForm {
            first_name: "A".into(),
            email: "bad".into(),
            password: "Secret1!".into(),
            confirm_password: Some("Secret2!".into()),
            city: "london".into(),
            area: "manhattan".into(),
            ..RegistrationForm::default()
        };
        let errors = field_errors(validate_registration(&form).unwrap_err());
        assert_eq!(errors["firstName"], "Must be at least 2 characters");
        assert_eq!(errors["lastName"], REQUIRED);
        assert_eq!(errors["email"], "Please enter a valid email address");
        assert_eq!(errors["phone"], "Phone number is required");
        assert_eq!(errors["confirmPassword"], "Passwords do not match");
        assert_eq!(errors["area"], "Area does not belong to the selected city");
        assert!(!errors.contains_key("password"));
    }

    #[test]
    fn test_weak_password_rejected_with_strength_message() {
        let form = RegistrationForm {
            first_name: "Ana".into(),
            last_name: "Lima".into(),
            email: "ana@example.com".into(),
            phone: "+44 7700 900123".into(),
            password: "______".into(),
            confirm_password: None,
            city: "london".into(),
            area: "central-london".into(),
        };
        let errors = field_errors(validate_registration(&form).unwrap_err());
        assert_eq!(errors["password"], "Password is too weak");
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_event_form_valid() {
        let event = validate_event_form(&event_form(), today()).unwrap();
        assert_eq!(event.max_participants, 10);
        assert_eq!(event.time, NaiveTime::from_hms_opt(18, 30, 0).unwrap());
        assert_eq!(event.skill_level, SkillLevel::Beginner);
    }

    #[test]
    fn test_event_form_rules() {
        let form = EventForm {
            title: "  ".into(),
            date: "2030-05-31".into(),
            max_participants: Some(51),
            skill_level: "expert".into(),
            ..event_form()
        };
        let errors = field_errors(validate_event_form(&form, today()).unwrap_err());
        assert_eq!(errors["title"], REQUIRED);
        assert_eq!(errors["date"], "Event date cannot be in the past");
        assert_eq!(errors["maxParticipants"], "Participants must be between 2 and 50");
        assert_eq!(errors["skillLevel"], "Unknown skill level");
    }

    #[test]
    fn test_event_date_today_allowed() {
        let form = EventForm { date: "2030-06-01".into(), ..event_form() };
        assert!(validate_event_form(&form, today()).is_ok());
    }

    #[test]
    fn test_patch_capacity_below_roster() {
        let form = EventPatchForm { max_participants: Some(3), ..EventPatchForm::default() };
        let errors = field_errors(
            validate_event_patch(&form, today(), "london", "central-london", 4).unwrap_err(),
        );
        assert_eq!(errors["maxParticipants"], "Event already has 4 participants");

        let patch = validate_event_patch(&form, today(), "london", "central-london", 3).unwrap();
        assert_eq!(patch.max_participants, Some(3));
    }

    #[test]
    fn test_patch_area_checked_against_current_city() {
        let form = EventPatchForm { area: Some("north-london".into()), ..EventPatchForm::default() };
        let patch = validate_event_patch(&form, today(), "london", "central-london", 1).unwrap();
        assert_eq!(patch.area.as_deref(), Some("north-london"));
        assert_eq!(patch.city, None);

        let form = EventPatchForm { area: Some("bondi".into()), ..EventPatchForm::default() };
        assert!(validate_event_patch(&form, today(), "london", "central-london", 1).is_err());
    }

    #[test]
    fn test_empty_patch_rejected() {
        let err = validate_event_patch(&EventPatchForm::default(), today(), "london", "central-london", 1)
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
