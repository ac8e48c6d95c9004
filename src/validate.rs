//! Per-step validation for the loan application wizard.
//!
//! Four pure passes, one per step. Each takes a draft snapshot and returns a
//! map of wire field name -> human-readable message; an empty map means the
//! step is valid. The same passes run server-side on intake, so the pipeline
//! never trusts the client.

use std::collections::BTreeMap;

use crate::models::LoanDraft;

/// Field-level errors for one step, keyed by wire field name.
pub type FieldErrors = BTreeMap<&'static str, String>;

pub const GENDER_OPTIONS: [&str; 3] = ["Male", "Female", "Other"];
pub const RELIGION_OPTIONS: [&str; 4] = ["Hindu", "Muslim", "Christian", "Other"];
pub const MARITAL_STATUS_OPTIONS: [&str; 4] = ["Single", "Married", "Divorced", "Widowed"];
pub const RELATIONSHIP_OPTIONS: [&str; 3] = ["Spouse", "Son", "Daughter"];

pub const CIBIL_LEN: usize = 3;
pub const AADHAAR_LEN: usize = 12;
pub const MOBILE_LEN: usize = 10;
pub const PINCODE_LEN: usize = 6;

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

fn exact_digits(s: &str, len: usize) -> bool {
    s.len() == len && is_digits(s)
}

/// Point-of-entry gate for digit-only fields: the prospective value is
/// accepted only while it is all digits and within the fixed length. Callers
/// keep the previous value when this returns false, so bad characters never
/// land in the draft in the first place.
pub fn accept_digit_input(value: &str, max_len: usize) -> bool {
    value.len() <= max_len && value.chars().all(|c| c.is_ascii_digit())
}

/// Aadhaar display form: bare digits grouped in blocks of 4
/// (`123412341234` -> `1234 1234 1234`). Storage always keeps the bare form.
pub fn format_aadhaar(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + raw.len() / 4);
    for (i, c) in raw.chars().enumerate() {
        if i > 0 && i % 4 == 0 {
            out.push(' ');
        }
        out.push(c);
    }
    out
}

/// Step 1: member identity.
pub fn validate_step1(draft: &LoanDraft) -> FieldErrors {
    let mut e = FieldErrors::new();
    if !exact_digits(&draft.member_cibil, CIBIL_LEN) {
        e.insert("memberCibil", "CIBIL required (3 digits)".to_string());
    }
    if draft.person_name.is_empty() {
        e.insert("personName", "Name required".to_string());
    }
    if draft.dateofbirth.is_empty() {
        e.insert("dateofbirth", "DOB required".to_string());
    }
    if !GENDER_OPTIONS.contains(&draft.gender.as_str()) {
        e.insert("gender", "Gender required".to_string());
    }
    if !RELIGION_OPTIONS.contains(&draft.religion.as_str()) {
        e.insert("religion", "Religion required".to_string());
    }
    if !MARITAL_STATUS_OPTIONS.contains(&draft.marital_status.as_str()) {
        e.insert("maritalStatus", "Marital status required".to_string());
    }
    if !exact_digits(&draft.aadhar_no, AADHAAR_LEN) {
        e.insert("aadharNo", "Valid Aadhaar required".to_string());
    }
    if draft.memberwork.is_empty() {
        e.insert("memberwork", "Work required".to_string());
    }
    if draft.annual_income.is_empty() {
        e.insert("annualIncome", "Income required".to_string());
    }
    e
}

/// Step 2: nominee identity. Presence only, no numeric constraints.
pub fn validate_step2(draft: &LoanDraft) -> FieldErrors {
    let mut e = FieldErrors::new();
    if draft.nominee_name.is_empty() {
        e.insert("nomineeName", "Nominee name required".to_string());
    }
    if draft.nominee_dob.is_empty() {
        e.insert("nomineeDob", "Nominee DOB required".to_string());
    }
    if draft.nominee_gender.is_empty() {
        e.insert("nomineeGender", "Nominee gender required".to_string());
    }
    if draft.nominee_religion.is_empty() {
        e.insert("nomineeReligion", "Nominee religion required".to_string());
    }
    if draft.nominee_marital_status.is_empty() {
        e.insert(
            "nomineeMaritalStatus",
            "Nominee marital status required".to_string(),
        );
    }
    if draft.nominee_relationship.is_empty() {
        e.insert(
            "nomineeRelationship",
            "Nominee relationship required".to_string(),
        );
    }
    if draft.nominee_business.is_empty() {
        e.insert("nomineeBusiness", "Nominee business required".to_string());
    }
    e
}

/// Step 3: contact. The two mobiles must both be 10 digits and must differ.
pub fn validate_step3(draft: &LoanDraft) -> FieldErrors {
    let mut e = FieldErrors::new();
    if !exact_digits(&draft.mobile_no, MOBILE_LEN) {
        e.insert("mobileNo", "Valid mobile required".to_string());
    }
    if !exact_digits(&draft.nominee_mobile, MOBILE_LEN) {
        e.insert("nomineeMobile", "Valid nominee mobile required".to_string());
    } else if draft.nominee_mobile == draft.mobile_no {
        e.insert(
            "nomineeMobile",
            "Nominee mobile cannot be same as member mobile".to_string(),
        );
    }
    if draft.address.is_empty() {
        e.insert("address", "Address required".to_string());
    }
    if !exact_digits(&draft.pincode, PINCODE_LEN) {
        e.insert("pincode", "Valid pincode required".to_string());
    }
    // memberEmail is optional and not validated here.
    e
}

/// Step 4: every document slot must be populated before submission.
pub fn validate_step4(draft: &LoanDraft) -> FieldErrors {
    let mut e = FieldErrors::new();
    for slot in draft.documents.missing_slots() {
        e.insert(slot.field_name(), "Required".to_string());
    }
    e
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentImage, DocumentSlot};

    fn valid_scalar_draft() -> LoanDraft {
        LoanDraft {
            member_cibil: "712".to_string(),
            person_name: "Lakshmi Devi".to_string(),
            dateofbirth: "1988-04-02".to_string(),
            gender: "Female".to_string(),
            religion: "Hindu".to_string(),
            marital_status: "Married".to_string(),
            aadhar_no: "123412341234".to_string(),
            memberwork: "Tailoring".to_string(),
            annual_income: "120000".to_string(),
            nominee_name: "Ravi Kumar".to_string(),
            nominee_dob: "1985-01-15".to_string(),
            nominee_gender: "Male".to_string(),
            nominee_religion: "Hindu".to_string(),
            nominee_marital_status: "Married".to_string(),
            nominee_relationship: "Spouse".to_string(),
            nominee_business: "Farming".to_string(),
            mobile_no: "9876543210".to_string(),
            nominee_mobile: "9876500000".to_string(),
            member_email: String::new(),
            address: "12 Main Road, Salem".to_string(),
            pincode: "636001".to_string(),
            ..LoanDraft::default()
        }
    }

    fn dummy_image() -> DocumentImage {
        DocumentImage {
            bytes: vec![0xFF, 0xD8],
            content_type: "image/jpeg".to_string(),
            file_name: "cropped.jpg".to_string(),
        }
    }

    #[test]
    fn test_valid_draft_passes_steps_1_to_3() {
        let draft = valid_scalar_draft();
        assert!(validate_step1(&draft).is_empty());
        assert!(validate_step2(&draft).is_empty());
        assert!(validate_step3(&draft).is_empty());
    }

    #[test]
    fn test_two_digit_cibil_flags_only_that_field() {
        // Scenario: CIBIL "12" must fail step 1 on memberCibil alone.
        let mut draft = valid_scalar_draft();
        draft.member_cibil = "12".to_string();

        let errors = validate_step1(&draft);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors["memberCibil"], "CIBIL required (3 digits)");
    }

    #[test]
    fn test_aadhaar_rejects_wrong_length_and_non_digits() {
        let mut draft = valid_scalar_draft();
        draft.aadhar_no = "12341234123".to_string(); // 11 digits
        assert!(validate_step1(&draft).contains_key("aadharNo"));

        draft.aadhar_no = "12341234123X".to_string(); // 12 chars, not all digits
        assert!(validate_step1(&draft).contains_key("aadharNo"));
    }

    #[test]
    fn test_gender_outside_option_set_rejected() {
        let mut draft = valid_scalar_draft();
        draft.gender = "Unspecified".to_string();
        assert!(validate_step1(&draft).contains_key("gender"));
    }

    #[test]
    fn test_step2_reports_every_missing_field() {
        let errors = validate_step2(&LoanDraft::default());
        assert_eq!(errors.len(), 7);
        assert_eq!(errors["nomineeName"], "Nominee name required");
        assert_eq!(errors["nomineeBusiness"], "Nominee business required");
    }

    #[test]
    fn test_identical_mobiles_flag_nominee_mobile() {
        // Scenario: both mobiles "9876543210" -> nomineeMobile flagged.
        let mut draft = valid_scalar_draft();
        draft.nominee_mobile = draft.mobile_no.clone();

        let errors = validate_step3(&draft);
        assert_eq!(
            errors["nomineeMobile"],
            "Nominee mobile cannot be same as member mobile"
        );
        assert!(!errors.contains_key("mobileNo"));
    }

    #[test]
    fn test_distinct_ten_digit_mobiles_pass() {
        let draft = valid_scalar_draft();
        assert!(!validate_step3(&draft).contains_key("nomineeMobile"));
    }

    #[test]
    fn test_missing_email_is_not_an_error() {
        let mut draft = valid_scalar_draft();
        draft.member_email = String::new();
        assert!(validate_step3(&draft).is_empty());
    }

    #[test]
    fn test_step4_lists_exactly_the_empty_slots() {
        let mut draft = valid_scalar_draft();
        for slot in DocumentSlot::ALL {
            if slot != DocumentSlot::PanCard && slot != DocumentSlot::Signature {
                draft.documents.set(slot, dummy_image());
            }
        }

        let errors = validate_step4(&draft);
        assert_eq!(errors.len(), 2);
        assert!(errors.contains_key("panCard"));
        assert!(errors.contains_key("signature"));

        draft.documents.set(DocumentSlot::PanCard, dummy_image());
        draft.documents.set(DocumentSlot::Signature, dummy_image());
        assert!(validate_step4(&draft).is_empty());
    }

    #[test]
    fn test_digit_gate_rejects_at_entry() {
        // Aadhaar-style field: 12 digit cap.
        assert!(accept_digit_input("", AADHAAR_LEN));
        assert!(accept_digit_input("123412341234", AADHAAR_LEN));
        assert!(!accept_digit_input("1234123412345", AADHAAR_LEN)); // too long
        assert!(!accept_digit_input("12341234123a", AADHAAR_LEN)); // non-digit
        // Mobile-style field.
        assert!(!accept_digit_input("98765432101", MOBILE_LEN));
        assert!(!accept_digit_input("98-7654321", MOBILE_LEN));
    }

    #[test]
    fn test_aadhaar_display_grouping() {
        assert_eq!(format_aadhaar("123412341234"), "1234 1234 1234");
        assert_eq!(format_aadhaar("12341"), "1234 1");
        assert_eq!(format_aadhaar(""), "");
    }
}
