use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub blocked: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Center {
    pub id: String,
    pub name: String,
}

/// A borrower enrolled under a center. The optional profile fields seed the
/// first wizard step when a loan is opened for this member.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Member {
    pub id: String,
    pub center_id: String,
    pub name: String,
    #[serde(default)]
    pub member_cibil: Option<String>,
    #[serde(default)]
    pub dateofbirth: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
}

/// JWT claims carried by the bearer token.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthPayload {
    pub sub: String, // user id
    pub name: String,
    pub admin: bool,
    pub exp: usize,
}

/// Lifecycle of a persisted loan. Only the transitions below are legal;
/// everything else is rejected by the record store.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    Pending,
    Approved,
    Rejected,
    Credited,
}

impl LoanStatus {
    /// PENDING -> APPROVED | REJECTED, APPROVED -> CREDITED (disbursal side).
    pub fn can_transition_to(self, next: LoanStatus) -> bool {
        matches!(
            (self, next),
            (LoanStatus::Pending, LoanStatus::Approved)
                | (LoanStatus::Pending, LoanStatus::Rejected)
                | (LoanStatus::Approved, LoanStatus::Credited)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoanStatus::Pending => "PENDING",
            LoanStatus::Approved => "APPROVED",
            LoanStatus::Rejected => "REJECTED",
            LoanStatus::Credited => "CREDITED",
        }
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(LoanStatus::Pending),
            "APPROVED" => Ok(LoanStatus::Approved),
            "REJECTED" => Ok(LoanStatus::Rejected),
            "CREDITED" => Ok(LoanStatus::Credited),
            other => Err(format!("unknown loan status: {}", other)),
        }
    }
}

/// The 9 named document slots. The order and the wire names are a fixed
/// contract between the wizard and the upload pipeline; renaming one side
/// without the other breaks intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DocumentSlot {
    MemberAadhaarFront,
    MemberAadhaarBack,
    NomineeAadhaarFront,
    NomineeAadhaarBack,
    PanCard,
    FormImage,
    Signature,
    MemberPhoto,
    PassbookImage,
}

impl DocumentSlot {
    pub const ALL: [DocumentSlot; 9] = [
        DocumentSlot::MemberAadhaarFront,
        DocumentSlot::MemberAadhaarBack,
        DocumentSlot::NomineeAadhaarFront,
        DocumentSlot::NomineeAadhaarBack,
        DocumentSlot::PanCard,
        DocumentSlot::FormImage,
        DocumentSlot::Signature,
        DocumentSlot::MemberPhoto,
        DocumentSlot::PassbookImage,
    ];

    /// Multipart part name / error-map key for this slot.
    pub fn field_name(self) -> &'static str {
        match self {
            DocumentSlot::MemberAadhaarFront => "memberAadhaarFront",
            DocumentSlot::MemberAadhaarBack => "memberAadhaarBack",
            DocumentSlot::NomineeAadhaarFront => "nomineeAadhaarFront",
            DocumentSlot::NomineeAadhaarBack => "nomineeAadhaarBack",
            DocumentSlot::PanCard => "panCard",
            DocumentSlot::FormImage => "formImage",
            DocumentSlot::Signature => "signature",
            DocumentSlot::MemberPhoto => "memberPhoto",
            DocumentSlot::PassbookImage => "passbookImage",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DocumentSlot::MemberAadhaarFront => "Member Aadhaar Front",
            DocumentSlot::MemberAadhaarBack => "Member Aadhaar Back",
            DocumentSlot::NomineeAadhaarFront => "Nominee Aadhaar Front",
            DocumentSlot::NomineeAadhaarBack => "Nominee Aadhaar Back",
            DocumentSlot::PanCard => "PAN Card",
            DocumentSlot::FormImage => "Form Image",
            DocumentSlot::Signature => "Signature",
            DocumentSlot::MemberPhoto => "Member Photo",
            DocumentSlot::PassbookImage => "Passbook Image",
        }
    }

    pub fn from_field_name(name: &str) -> Option<DocumentSlot> {
        DocumentSlot::ALL
            .into_iter()
            .find(|slot| slot.field_name() == name)
    }
}

/// One captured document image, already cropped and re-encoded client-side.
#[derive(Debug, Clone)]
pub struct DocumentImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub file_name: String,
}

/// The in-progress application held in wizard memory. Scalars mirror the
/// multipart wire fields; documents fill one by one through the crop flow.
#[derive(Debug, Clone, Default)]
pub struct LoanDraft {
    // Member identity (step 1)
    pub member_cibil: String,
    pub person_name: String,
    pub dateofbirth: String,
    pub gender: String,
    pub religion: String,
    pub marital_status: String,
    pub aadhar_no: String,
    pub memberwork: String,
    pub annual_income: String,
    // Nominee identity (step 2)
    pub nominee_name: String,
    pub nominee_dob: String,
    pub nominee_gender: String,
    pub nominee_religion: String,
    pub nominee_marital_status: String,
    pub nominee_relationship: String,
    pub nominee_business: String,
    // Contact (step 3)
    pub mobile_no: String,
    pub nominee_mobile: String,
    pub member_email: String,
    pub address: String,
    pub pincode: String,
    // Documents (step 4)
    pub documents: DocumentSet,
}

impl LoanDraft {
    /// Seed the first step from the member the application was opened for.
    pub fn for_member(member: &Member) -> Self {
        LoanDraft {
            member_cibil: member.member_cibil.clone().unwrap_or_default(),
            person_name: member.name.clone(),
            dateofbirth: member.dateofbirth.clone().unwrap_or_default(),
            gender: member.gender.clone().unwrap_or_default(),
            ..LoanDraft::default()
        }
    }
}

/// Holder for the 9 document slots, addressable by `DocumentSlot`.
#[derive(Debug, Clone, Default)]
pub struct DocumentSet {
    pub member_aadhaar_front: Option<DocumentImage>,
    pub member_aadhaar_back: Option<DocumentImage>,
    pub nominee_aadhaar_front: Option<DocumentImage>,
    pub nominee_aadhaar_back: Option<DocumentImage>,
    pub pan_card: Option<DocumentImage>,
    pub form_image: Option<DocumentImage>,
    pub signature: Option<DocumentImage>,
    pub member_photo: Option<DocumentImage>,
    pub passbook_image: Option<DocumentImage>,
}

impl DocumentSet {
    pub fn get(&self, slot: DocumentSlot) -> Option<&DocumentImage> {
        match slot {
            DocumentSlot::MemberAadhaarFront => self.member_aadhaar_front.as_ref(),
            DocumentSlot::MemberAadhaarBack => self.member_aadhaar_back.as_ref(),
            DocumentSlot::NomineeAadhaarFront => self.nominee_aadhaar_front.as_ref(),
            DocumentSlot::NomineeAadhaarBack => self.nominee_aadhaar_back.as_ref(),
            DocumentSlot::PanCard => self.pan_card.as_ref(),
            DocumentSlot::FormImage => self.form_image.as_ref(),
            DocumentSlot::Signature => self.signature.as_ref(),
            DocumentSlot::MemberPhoto => self.member_photo.as_ref(),
            DocumentSlot::PassbookImage => self.passbook_image.as_ref(),
        }
    }

    pub fn set(&mut self, slot: DocumentSlot, image: DocumentImage) {
        let target = match slot {
            DocumentSlot::MemberAadhaarFront => &mut self.member_aadhaar_front,
            DocumentSlot::MemberAadhaarBack => &mut self.member_aadhaar_back,
            DocumentSlot::NomineeAadhaarFront => &mut self.nominee_aadhaar_front,
            DocumentSlot::NomineeAadhaarBack => &mut self.nominee_aadhaar_back,
            DocumentSlot::PanCard => &mut self.pan_card,
            DocumentSlot::FormImage => &mut self.form_image,
            DocumentSlot::Signature => &mut self.signature,
            DocumentSlot::MemberPhoto => &mut self.member_photo,
            DocumentSlot::PassbookImage => &mut self.passbook_image,
        };
        *target = Some(image);
    }

    pub fn missing_slots(&self) -> Vec<DocumentSlot> {
        DocumentSlot::ALL
            .into_iter()
            .filter(|slot| self.get(*slot).is_none())
            .collect()
    }
}

/// Resolved storage keys for the document slots of a persisted loan. Every
/// column is always present; an absent slot serializes as null, never omitted.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentPaths {
    pub member_aadhaar_front: Option<String>,
    pub member_aadhaar_back: Option<String>,
    pub nominee_aadhaar_front: Option<String>,
    pub nominee_aadhaar_back: Option<String>,
    pub pan_card: Option<String>,
    pub form_image: Option<String>,
    pub signature: Option<String>,
    pub member_photo: Option<String>,
    pub passbook_image: Option<String>,
}

impl DocumentPaths {
    pub fn set(&mut self, slot: DocumentSlot, key: String) {
        let target = match slot {
            DocumentSlot::MemberAadhaarFront => &mut self.member_aadhaar_front,
            DocumentSlot::MemberAadhaarBack => &mut self.member_aadhaar_back,
            DocumentSlot::NomineeAadhaarFront => &mut self.nominee_aadhaar_front,
            DocumentSlot::NomineeAadhaarBack => &mut self.nominee_aadhaar_back,
            DocumentSlot::PanCard => &mut self.pan_card,
            DocumentSlot::FormImage => &mut self.form_image,
            DocumentSlot::Signature => &mut self.signature,
            DocumentSlot::MemberPhoto => &mut self.member_photo,
            DocumentSlot::PassbookImage => &mut self.passbook_image,
        };
        *target = Some(key);
    }

    pub fn get(&self, slot: DocumentSlot) -> Option<&String> {
        match slot {
            DocumentSlot::MemberAadhaarFront => self.member_aadhaar_front.as_ref(),
            DocumentSlot::MemberAadhaarBack => self.member_aadhaar_back.as_ref(),
            DocumentSlot::NomineeAadhaarFront => self.nominee_aadhaar_front.as_ref(),
            DocumentSlot::NomineeAadhaarBack => self.nominee_aadhaar_back.as_ref(),
            DocumentSlot::PanCard => self.pan_card.as_ref(),
            DocumentSlot::FormImage => self.form_image.as_ref(),
            DocumentSlot::Signature => self.signature.as_ref(),
            DocumentSlot::MemberPhoto => self.member_photo.as_ref(),
            DocumentSlot::PassbookImage => self.passbook_image.as_ref(),
        }
    }
}

/// Persisted loan: a flat snapshot of the draft plus resolved storage keys.
/// Immutable once inserted except for `status`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Loan {
    pub id: String,
    /// Human-readable sequence id (`LN-<digits>`), assigned at intake.
    pub loan_id: String,
    pub user_id: String,
    pub center_id: String,
    pub member_id: String,

    pub member_cibil: String,
    pub person_name: String,
    pub dateofbirth: String,
    pub gender: String,
    pub religion: String,
    pub marital_status: String,
    pub aadhar_no: String,
    pub memberwork: String,
    pub annual_income: String,

    pub nominee_name: String,
    pub nominee_dob: String,
    pub nominee_gender: String,
    pub nominee_religion: String,
    pub nominee_marital_status: String,
    pub nominee_relationship: String,
    pub nominee_business: String,

    pub mobile_no: String,
    pub nominee_mobile: String,
    pub member_email: String,
    pub address: String,
    pub pincode: String,

    pub documents: DocumentPaths,
    pub status: LoanStatus,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        assert!(LoanStatus::Pending.can_transition_to(LoanStatus::Approved));
        assert!(LoanStatus::Pending.can_transition_to(LoanStatus::Rejected));
        assert!(LoanStatus::Approved.can_transition_to(LoanStatus::Credited));

        assert!(!LoanStatus::Pending.can_transition_to(LoanStatus::Credited));
        assert!(!LoanStatus::Approved.can_transition_to(LoanStatus::Rejected));
        assert!(!LoanStatus::Rejected.can_transition_to(LoanStatus::Approved));
        assert!(!LoanStatus::Credited.can_transition_to(LoanStatus::Pending));
    }

    #[test]
    fn test_status_round_trips_through_wire_form() {
        for status in [
            LoanStatus::Pending,
            LoanStatus::Approved,
            LoanStatus::Rejected,
            LoanStatus::Credited,
        ] {
            let parsed: LoanStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("FROZEN".parse::<LoanStatus>().is_err());
    }

    #[test]
    fn test_slot_field_names_are_the_wire_contract() {
        let names: Vec<&str> = DocumentSlot::ALL.iter().map(|s| s.field_name()).collect();
        assert_eq!(
            names,
            vec![
                "memberAadhaarFront",
                "memberAadhaarBack",
                "nomineeAadhaarFront",
                "nomineeAadhaarBack",
                "panCard",
                "formImage",
                "signature",
                "memberPhoto",
                "passbookImage",
            ]
        );
        assert_eq!(
            DocumentSlot::from_field_name("panCard"),
            Some(DocumentSlot::PanCard)
        );
        assert_eq!(DocumentSlot::from_field_name("pancard"), None);
    }

    #[test]
    fn test_document_set_tracks_missing_slots() {
        let mut docs = DocumentSet::default();
        assert_eq!(docs.missing_slots().len(), 9);

        for slot in DocumentSlot::ALL {
            docs.set(
                slot,
                DocumentImage {
                    bytes: vec![0xFF],
                    content_type: "image/jpeg".to_string(),
                    file_name: "cropped.jpg".to_string(),
                },
            );
        }
        assert!(docs.missing_slots().is_empty());
        assert!(docs.get(DocumentSlot::Signature).is_some());
    }

    #[test]
    fn test_absent_document_paths_serialize_as_null() {
        let mut paths = DocumentPaths::default();
        paths.set(DocumentSlot::PanCard, "loans/LN-1/panCard-x.jpg".to_string());

        let json = serde_json::to_value(&paths).unwrap();
        assert_eq!(json["pan_card"], "loans/LN-1/panCard-x.jpg");
        // Empty slots must appear explicitly as null, never be dropped.
        assert!(json.get("signature").is_some());
        assert!(json["signature"].is_null());
    }

    #[test]
    fn test_draft_seeded_from_member_profile() {
        let member = Member {
            id: "m1".to_string(),
            center_id: "c1".to_string(),
            name: "Lakshmi Devi".to_string(),
            member_cibil: Some("712".to_string()),
            dateofbirth: Some("1988-04-02".to_string()),
            gender: Some("Female".to_string()),
        };
        let draft = LoanDraft::for_member(&member);
        assert_eq!(draft.person_name, "Lakshmi Devi");
        assert_eq!(draft.member_cibil, "712");
        assert_eq!(draft.gender, "Female");
        assert!(draft.nominee_name.is_empty());
    }
}
