//! Loan application wizard: four linear steps gated by per-step validators,
//! a crop sub-state for document capture, and a single-flight submission.
//!
//! The wizard owns the draft for its whole life. Context (user, center,
//! member) is injected at construction rather than looked up ambiently, so
//! the machine is testable in isolation; submission goes through the
//! `LoanSubmitter` seam for the same reason.

use async_trait::async_trait;
use thiserror::Error;

use crate::crop::{render_crop, CropError, CropSelection};
use crate::models::{Center, DocumentImage, DocumentSlot, LoanDraft, Member, User};
use crate::validate::{
    self, accept_digit_input, validate_step1, validate_step2, validate_step3, validate_step4,
    FieldErrors,
};

/// The four sequential screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Step {
    MemberIdentity,
    NomineeIdentity,
    Contact,
    Documents,
}

impl Step {
    pub fn index(self) -> u8 {
        match self {
            Step::MemberIdentity => 1,
            Step::NomineeIdentity => 2,
            Step::Contact => 3,
            Step::Documents => 4,
        }
    }

    fn next(self) -> Step {
        match self {
            Step::MemberIdentity => Step::NomineeIdentity,
            Step::NomineeIdentity => Step::Contact,
            Step::Contact => Step::Documents,
            Step::Documents => Step::Documents, // capped at 4
        }
    }

    fn previous(self) -> Step {
        match self {
            Step::MemberIdentity => Step::MemberIdentity,
            Step::NomineeIdentity => Step::MemberIdentity,
            Step::Contact => Step::NomineeIdentity,
            Step::Documents => Step::Contact,
        }
    }

    /// Validator dispatch for this step.
    pub fn validate(self, draft: &LoanDraft) -> FieldErrors {
        match self {
            Step::MemberIdentity => validate_step1(draft),
            Step::NomineeIdentity => validate_step2(draft),
            Step::Contact => validate_step3(draft),
            Step::Documents => validate_step4(draft),
        }
    }
}

/// The selected user/center/member the application is being filed under.
#[derive(Debug, Clone)]
pub struct WizardContext {
    pub user: User,
    pub center: Center,
    pub member: Member,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WizardState {
    InStep(Step),
    Submitting,
    SubmitSucceeded { loan_id: String },
    SubmitFailed { message: String },
}

#[derive(Debug, Error)]
pub enum WizardError {
    #[error("validation failed")]
    Invalid(FieldErrors),
    #[error("operation not allowed in the current wizard state")]
    WrongState,
    #[error("no file selected for cropping")]
    NoPendingCrop,
    #[error("Crop image first")]
    NoCropRegion,
    #[error(transparent)]
    Crop(#[from] CropError),
    #[error("submit failed: {0}")]
    Submit(String),
}

/// Submission seam: hands the finished draft (plus context) to the upload
/// pipeline and returns the assigned sequence id. The error string is the
/// user-facing transient message; the draft is preserved for retry.
#[async_trait]
pub trait LoanSubmitter {
    async fn submit(&self, ctx: &WizardContext, draft: &LoanDraft) -> Result<String, String>;
}

/// A file picked on the documents step, waiting for its crop region.
struct PendingCrop {
    slot: DocumentSlot,
    source: Vec<u8>,
    selection: Option<CropSelection>,
}

pub struct Wizard {
    ctx: WizardContext,
    draft: LoanDraft,
    state: WizardState,
    pending_crop: Option<PendingCrop>,
}

impl Wizard {
    /// Start at step 1, pre-populated from the selected member's profile.
    pub fn new(ctx: WizardContext) -> Self {
        let draft = LoanDraft::for_member(&ctx.member);
        Wizard {
            ctx,
            draft,
            state: WizardState::InStep(Step::MemberIdentity),
            pending_crop: None,
        }
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn current_step(&self) -> Option<Step> {
        match self.state {
            WizardState::InStep(step) => Some(step),
            _ => None,
        }
    }

    pub fn context(&self) -> &WizardContext {
        &self.ctx
    }

    pub fn draft(&self) -> &LoanDraft {
        &self.draft
    }

    /// Free-text fields are written directly; digit-gated fields go through
    /// the `enter_*` setters below.
    pub fn draft_mut(&mut self) -> &mut LoanDraft {
        &mut self.draft
    }

    /// Entry gates: the prospective value is dropped (and `false` returned)
    /// if it contains a non-digit or overruns the fixed length.
    pub fn enter_member_cibil(&mut self, value: &str) -> bool {
        Self::gated(&mut self.draft.member_cibil, value, validate::CIBIL_LEN)
    }

    pub fn enter_aadhaar(&mut self, value: &str) -> bool {
        // Display form may carry grouping spaces; the draft keeps bare digits.
        let raw: String = value.chars().filter(|c| *c != ' ').collect();
        Self::gated(&mut self.draft.aadhar_no, &raw, validate::AADHAAR_LEN)
    }

    pub fn enter_mobile_no(&mut self, value: &str) -> bool {
        Self::gated(&mut self.draft.mobile_no, value, validate::MOBILE_LEN)
    }

    pub fn enter_nominee_mobile(&mut self, value: &str) -> bool {
        Self::gated(&mut self.draft.nominee_mobile, value, validate::MOBILE_LEN)
    }

    pub fn enter_pincode(&mut self, value: &str) -> bool {
        Self::gated(&mut self.draft.pincode, value, validate::PINCODE_LEN)
    }

    fn gated(target: &mut String, value: &str, max_len: usize) -> bool {
        if accept_digit_input(value, max_len) {
            *target = value.to_string();
            true
        } else {
            false
        }
    }

    /// Forward navigation: validates the current step; on errors the wizard
    /// stays put and the caller gets the field map to surface inline.
    pub fn next(&mut self) -> Result<Step, WizardError> {
        let step = self.require_step()?;
        let errors = step.validate(&self.draft);
        if !errors.is_empty() {
            return Err(WizardError::Invalid(errors));
        }
        let next = step.next();
        self.state = WizardState::InStep(next);
        Ok(next)
    }

    /// Backward navigation never validates and never clears entered data.
    pub fn previous(&mut self) -> Result<Step, WizardError> {
        let step = self.require_step()?;
        let prev = step.previous();
        self.state = WizardState::InStep(prev);
        Ok(prev)
    }

    /// Selecting a file on the documents step opens the crop sub-state; the
    /// slot stays empty until a crop is confirmed.
    pub fn select_file(&mut self, slot: DocumentSlot, source: Vec<u8>) -> Result<(), WizardError> {
        if self.current_step() != Some(Step::Documents) {
            return Err(WizardError::WrongState);
        }
        self.pending_crop = Some(PendingCrop {
            slot,
            source,
            selection: None,
        });
        Ok(())
    }

    pub fn has_pending_crop(&self) -> bool {
        self.pending_crop.is_some()
    }

    /// Record the interactively chosen region/rotation for the pending file.
    pub fn set_crop_selection(&mut self, selection: CropSelection) -> Result<(), WizardError> {
        match self.pending_crop.as_mut() {
            Some(pending) => {
                pending.selection = Some(selection);
                Ok(())
            }
            None => Err(WizardError::NoPendingCrop),
        }
    }

    /// Rasterize the pending crop into its slot. Refused when no region has
    /// been confirmed; an uncropped source is never accepted silently.
    pub fn confirm_crop(&mut self) -> Result<(), WizardError> {
        let pending = self.pending_crop.as_ref().ok_or(WizardError::NoPendingCrop)?;
        let selection = pending.selection.ok_or(WizardError::NoCropRegion)?;
        let bytes = render_crop(&pending.source, &selection)?;
        let slot = pending.slot;
        self.draft.documents.set(
            slot,
            DocumentImage {
                bytes,
                content_type: "image/jpeg".to_string(),
                file_name: "cropped.jpg".to_string(),
            },
        );
        self.pending_crop = None;
        Ok(())
    }

    /// Abandon the pending crop; the chosen slot is left unset.
    pub fn cancel_crop(&mut self) {
        self.pending_crop = None;
    }

    /// Final submission, only from step 4. Holds `&mut self` across the
    /// call, so a second submission cannot start while one is in flight.
    pub async fn submit(&mut self, submitter: &dyn LoanSubmitter) -> Result<String, WizardError> {
        if self.current_step() != Some(Step::Documents) {
            return Err(WizardError::WrongState);
        }
        let errors = validate_step4(&self.draft);
        if !errors.is_empty() {
            return Err(WizardError::Invalid(errors));
        }

        self.state = WizardState::Submitting;
        match submitter.submit(&self.ctx, &self.draft).await {
            Ok(loan_id) => {
                // Success clears the draft; a fresh application starts over.
                self.draft = LoanDraft::for_member(&self.ctx.member);
                self.pending_crop = None;
                self.state = WizardState::SubmitSucceeded {
                    loan_id: loan_id.clone(),
                };
                Ok(loan_id)
            }
            Err(message) => {
                // Failure keeps every entered field and document for retry.
                self.state = WizardState::SubmitFailed {
                    message: message.clone(),
                };
                Err(WizardError::Submit(message))
            }
        }
    }

    /// After a failed submission, return to the documents step with the
    /// draft intact.
    pub fn retry(&mut self) -> Result<(), WizardError> {
        match self.state {
            WizardState::SubmitFailed { .. } => {
                self.state = WizardState::InStep(Step::Documents);
                Ok(())
            }
            _ => Err(WizardError::WrongState),
        }
    }

    /// Acknowledge a successful submission and start a new application.
    pub fn finish(&mut self) -> Result<(), WizardError> {
        match self.state {
            WizardState::SubmitSucceeded { .. } => {
                self.state = WizardState::InStep(Step::MemberIdentity);
                Ok(())
            }
            _ => Err(WizardError::WrongState),
        }
    }

    fn require_step(&self) -> Result<Step, WizardError> {
        self.current_step().ok_or(WizardError::WrongState)
    }
}
