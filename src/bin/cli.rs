//! loan-cli: drives the loan-intake API from the terminal.
//!
//! The `apply` command runs the real application wizard end to end: it walks
//! the four steps with the same validators the UI uses, pushes every document
//! through the crop rasterizer, and submits the multipart payload to the
//! server. The remaining commands are thin wrappers over the REST surface
//! (centers, members, loan listing, admin status changes, user blocking).

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use loan_intake::crop::{CropRegion, CropSelection};
use loan_intake::models::{Center, DocumentSlot, LoanDraft, Member, User};
use loan_intake::rest::LoginResponse;
use loan_intake::validate::format_aadhaar;
use loan_intake::wizard::{LoanSubmitter, Wizard, WizardContext, WizardError};

const SESSION_FILE: &str = ".loan_session";

#[derive(Parser)]
#[command(name = "loan-cli")]
#[command(about = "CLI client for the loan-intake service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, default_value = "http://localhost:5000")]
    url: String,
}

#[derive(Subcommand)]
enum Commands {
    Signup {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
        #[arg(long)]
        admin: bool,
    },
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    Logout,
    CreateCenter {
        #[arg(short, long)]
        name: String,
    },
    Centers,
    CreateMember {
        #[arg(short = 'c', long)]
        center_id: String,
        #[arg(short, long)]
        name: String,
        #[arg(long)]
        cibil: Option<String>,
        #[arg(long)]
        dob: Option<String>,
        #[arg(long)]
        gender: Option<String>,
    },
    Members {
        #[arg(short = 'c', long)]
        center_id: String,
    },
    /// Run the application wizard for a member and submit the loan.
    Apply {
        #[arg(short = 'c', long)]
        center_id: String,
        #[arg(short = 'm', long)]
        member_id: String,
        /// JSON file with the scalar draft fields (camelCase keys).
        #[arg(short, long)]
        draft: PathBuf,
        /// Directory holding one image per slot (e.g. panCard.jpg).
        #[arg(short = 'D', long)]
        docs: PathBuf,
    },
    /// All loans (admin).
    Loans,
    /// Loans filed by the logged-in user.
    MyLoans,
    Loan {
        #[arg(short, long)]
        id: String,
    },
    SetStatus {
        #[arg(short, long)]
        id: String,
        /// PENDING/APPROVED/REJECTED/CREDITED
        #[arg(short, long)]
        status: String,
    },
    DeleteLoan {
        #[arg(short, long)]
        id: String,
    },
    Users,
    Block {
        #[arg(short, long)]
        id: String,
    },
    Unblock {
        #[arg(short, long)]
        id: String,
    },
    /// Loan counts by status; --watch polls on a fixed interval.
    Counts {
        #[arg(long)]
        watch: Option<u64>,
    },
}

#[derive(Deserialize)]
struct SubmitResponse {
    #[serde(rename = "loanId")]
    loan_id: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    message: String,
    #[serde(default)]
    fields: Option<serde_json::Value>,
}

/// Scalar draft fields as laid out in the `apply` JSON file.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct DraftInput {
    member_cibil: String,
    person_name: String,
    dateofbirth: String,
    gender: String,
    religion: String,
    marital_status: String,
    aadhar_no: String,
    memberwork: String,
    annual_income: String,
    nominee_name: String,
    nominee_dob: String,
    nominee_gender: String,
    nominee_religion: String,
    nominee_marital_status: String,
    nominee_relationship: String,
    nominee_business: String,
    mobile_no: String,
    nominee_mobile: String,
    member_email: String,
    address: String,
    pincode: String,
}

fn load_session() -> Result<LoginResponse, Box<dyn std::error::Error>> {
    let raw = fs::read_to_string(SESSION_FILE)
        .map_err(|_| "not logged in (run: loan-cli login)".to_string())?;
    Ok(serde_json::from_str(&raw)?)
}

fn bearer(session: &LoginResponse) -> String {
    format!("Bearer {}", session.token)
}

/// Submits the finished draft over HTTP as the multipart intake request.
struct HttpLoanSubmitter {
    client: Client,
    url: String,
    token: String,
}

#[async_trait]
impl LoanSubmitter for HttpLoanSubmitter {
    async fn submit(&self, ctx: &WizardContext, draft: &LoanDraft) -> Result<String, String> {
        let mut form = Form::new()
            .text("userId", ctx.user.id.clone())
            .text("centerId", ctx.center.id.clone())
            .text("memberId", ctx.member.id.clone())
            .text("memberCibil", draft.member_cibil.clone())
            .text("personName", draft.person_name.clone())
            .text("dateofbirth", draft.dateofbirth.clone())
            .text("gender", draft.gender.clone())
            .text("religion", draft.religion.clone())
            .text("maritalStatus", draft.marital_status.clone())
            .text("aadharNo", draft.aadhar_no.clone())
            .text("memberwork", draft.memberwork.clone())
            .text("annualIncome", draft.annual_income.clone())
            .text("nomineeName", draft.nominee_name.clone())
            .text("nomineeDob", draft.nominee_dob.clone())
            .text("nomineeGender", draft.nominee_gender.clone())
            .text("nomineeReligion", draft.nominee_religion.clone())
            .text("nomineeMaritalStatus", draft.nominee_marital_status.clone())
            .text("nomineeRelationship", draft.nominee_relationship.clone())
            .text("nomineeBusiness", draft.nominee_business.clone())
            .text("mobileNo", draft.mobile_no.clone())
            .text("nomineeMobile", draft.nominee_mobile.clone())
            .text("memberEmail", draft.member_email.clone())
            .text("address", draft.address.clone())
            .text("pincode", draft.pincode.clone());

        for slot in DocumentSlot::ALL {
            if let Some(image) = draft.documents.get(slot) {
                let part = Part::bytes(image.bytes.clone())
                    .file_name(image.file_name.clone())
                    .mime_str(&image.content_type)
                    .map_err(|e| e.to_string())?;
                form = form.part(slot.field_name(), part);
            }
        }

        let res = self
            .client
            .post(format!("{}/api/loans", self.url))
            .header("Authorization", format!("Bearer {}", self.token))
            .multipart(form)
            .send()
            .await
            .map_err(|e| format!("network error: {e}"))?;

        if res.status().is_success() {
            let body: SubmitResponse = res.json().await.map_err(|e| e.to_string())?;
            Ok(body.loan_id)
        } else {
            let status = res.status();
            let body: ErrorResponse = res
                .json()
                .await
                .unwrap_or_else(|_| ErrorResponse {
                    message: format!("server returned {status}"),
                    fields: None,
                });
            match body.fields {
                Some(fields) => Err(format!("{} ({fields})", body.message)),
                None => Err(body.message),
            }
        }
    }
}

/// Walk the wizard: fill scalars, advance through the gated steps, crop every
/// document full-frame, submit.
async fn run_apply(
    client: &Client,
    url: &str,
    center_id: &str,
    member_id: &str,
    draft_path: &Path,
    docs_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = load_session()?;

    // Resolve the selected center and member; the wizard takes them as
    // explicit context.
    let centers: Vec<Center> = client
        .get(format!("{url}/api/centers"))
        .header("Authorization", bearer(&session))
        .send()
        .await?
        .json()
        .await?;
    let center = centers
        .into_iter()
        .find(|c| c.id == center_id)
        .ok_or("center not found; run: loan-cli centers")?;

    let members: Vec<Member> = client
        .get(format!("{url}/api/members/{center_id}"))
        .header("Authorization", bearer(&session))
        .send()
        .await?
        .json()
        .await?;
    let member = members
        .into_iter()
        .find(|m| m.id == member_id)
        .ok_or("member not found in that center; run: loan-cli members")?;

    let user = User {
        id: session.user.id.clone(),
        name: session.user.name.clone(),
        email: session.user.email.clone(),
        password_hash: String::new(),
        is_admin: session.user.is_admin,
        blocked: session.user.blocked,
    };
    let mut wizard = Wizard::new(WizardContext {
        user,
        center,
        member,
    });

    let input: DraftInput = serde_json::from_str(&fs::read_to_string(draft_path)?)?;
    apply_draft_input(&mut wizard, &input)?;

    // Steps 1-3: the validators gate every forward move.
    for _ in 0..3 {
        if let Err(WizardError::Invalid(errors)) = wizard.next() {
            eprintln!("Validation failed on step {}:", wizard.current_step().map(|s| s.index()).unwrap_or(0));
            for (field, message) in errors {
                eprintln!("  {field}: {message}");
            }
            return Err("fix the draft file and retry".into());
        }
    }

    println!(
        "Applicant {} (Aadhaar {})",
        wizard.draft().person_name,
        format_aadhaar(&wizard.draft().aadhar_no)
    );

    // Step 4: each slot goes through the crop rasterizer (full frame here;
    // the interactive UI would pass the user-chosen region instead).
    for slot in DocumentSlot::ALL {
        let source = read_slot_image(docs_dir, slot)?;
        let dims = image::load_from_memory(&source)
            .map_err(|e| format!("{}: {e}", slot.field_name()))?;
        wizard.select_file(slot, source)?;
        wizard.set_crop_selection(CropSelection {
            region: CropRegion {
                x: 0.0,
                y: 0.0,
                width: dims.width() as f32,
                height: dims.height() as f32,
            },
            displayed_width: dims.width() as f32,
            displayed_height: dims.height() as f32,
            rotation_deg: 0,
        })?;
        wizard.confirm_crop()?;
        println!("attached {}", slot.label());
    }

    let submitter = HttpLoanSubmitter {
        client: client.clone(),
        url: url.to_string(),
        token: session.token.clone(),
    };
    match wizard.submit(&submitter).await {
        Ok(loan_id) => {
            println!("Loan submitted ✔ ID: {loan_id}");
            Ok(())
        }
        Err(WizardError::Submit(message)) => {
            // Draft survives in the wizard; in the CLI the retry is simply
            // re-running the command.
            Err(format!("submit failed: {message}").into())
        }
        Err(e) => Err(e.into()),
    }
}

fn apply_draft_input(wizard: &mut Wizard, input: &DraftInput) -> Result<(), String> {
    // Digit-gated fields go through the entry gates so a bad draft file is
    // caught exactly where typing would have been.
    let gates = [
        ("memberCibil", wizard.enter_member_cibil(&input.member_cibil)),
        ("aadharNo", wizard.enter_aadhaar(&input.aadhar_no)),
        ("mobileNo", wizard.enter_mobile_no(&input.mobile_no)),
        ("nomineeMobile", wizard.enter_nominee_mobile(&input.nominee_mobile)),
        ("pincode", wizard.enter_pincode(&input.pincode)),
    ];
    for (field, accepted) in gates {
        if !accepted {
            return Err(format!("{field} rejected: digits only, fixed length"));
        }
    }

    let draft = wizard.draft_mut();
    if !input.person_name.is_empty() {
        draft.person_name = input.person_name.clone();
    }
    if !input.dateofbirth.is_empty() {
        draft.dateofbirth = input.dateofbirth.clone();
    }
    if !input.gender.is_empty() {
        draft.gender = input.gender.clone();
    }
    draft.religion = input.religion.clone();
    draft.marital_status = input.marital_status.clone();
    draft.memberwork = input.memberwork.clone();
    draft.annual_income = input.annual_income.clone();
    draft.nominee_name = input.nominee_name.clone();
    draft.nominee_dob = input.nominee_dob.clone();
    draft.nominee_gender = input.nominee_gender.clone();
    draft.nominee_religion = input.nominee_religion.clone();
    draft.nominee_marital_status = input.nominee_marital_status.clone();
    draft.nominee_relationship = input.nominee_relationship.clone();
    draft.nominee_business = input.nominee_business.clone();
    draft.member_email = input.member_email.clone();
    draft.address = input.address.clone();
    Ok(())
}

fn read_slot_image(docs_dir: &Path, slot: DocumentSlot) -> Result<Vec<u8>, String> {
    for ext in ["jpg", "jpeg", "png"] {
        let candidate = docs_dir.join(format!("{}.{ext}", slot.field_name()));
        if candidate.is_file() {
            return fs::read(&candidate).map_err(|e| format!("{}: {e}", candidate.display()));
        }
    }
    Err(format!(
        "missing document image for {} (expected {}/{}.jpg|.png)",
        slot.label(),
        docs_dir.display(),
        slot.field_name()
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = Client::new();

    match cli.command {
        Commands::Signup {
            name,
            email,
            password,
            admin,
        } => {
            let res = client
                .post(format!("{}/api/auth/signup", cli.url))
                .json(&json!({ "name": name, "email": email, "password": password, "isAdmin": admin }))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::Login { email, password } => {
            let res = client
                .post(format!("{}/api/auth/login", cli.url))
                .json(&json!({ "email": email, "password": password }))
                .send()
                .await?;
            if res.status().is_success() {
                let body = res.text().await?;
                fs::write(SESSION_FILE, &body)?;
                let session: LoginResponse = serde_json::from_str(&body)?;
                println!(
                    "Logged in as {} ({}). Session saved to {SESSION_FILE}",
                    session.user.name,
                    if session.user.is_admin { "admin" } else { "agent" },
                );
            } else {
                println!("Login failed: {}", res.text().await?);
            }
        }
        Commands::Logout => {
            let _ = fs::remove_file(SESSION_FILE);
            println!("Logged out (session removed).");
        }
        Commands::CreateCenter { name } => {
            let session = load_session()?;
            let res = client
                .post(format!("{}/api/centers", cli.url))
                .header("Authorization", bearer(&session))
                .json(&json!({ "name": name }))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::Centers => {
            let session = load_session()?;
            let res = client
                .get(format!("{}/api/centers", cli.url))
                .header("Authorization", bearer(&session))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::CreateMember {
            center_id,
            name,
            cibil,
            dob,
            gender,
        } => {
            let session = load_session()?;
            let res = client
                .post(format!("{}/api/members", cli.url))
                .header("Authorization", bearer(&session))
                .json(&json!({
                    "name": name,
                    "centerId": center_id,
                    "memberCibil": cibil,
                    "dateofbirth": dob,
                    "gender": gender,
                }))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::Members { center_id } => {
            let session = load_session()?;
            let res = client
                .get(format!("{}/api/members/{center_id}", cli.url))
                .header("Authorization", bearer(&session))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::Apply {
            center_id,
            member_id,
            draft,
            docs,
        } => {
            run_apply(&client, &cli.url, &center_id, &member_id, &draft, &docs).await?;
        }
        Commands::Loans => {
            let session = load_session()?;
            let res = client
                .get(format!("{}/api/loans", cli.url))
                .header("Authorization", bearer(&session))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::MyLoans => {
            let session = load_session()?;
            let res = client
                .get(format!("{}/api/users/{}/loans", cli.url, session.user.id))
                .header("Authorization", bearer(&session))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::Loan { id } => {
            let session = load_session()?;
            let res = client
                .get(format!("{}/api/loans/{id}", cli.url))
                .header("Authorization", bearer(&session))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::SetStatus { id, status } => {
            let session = load_session()?;
            let res = client
                .patch(format!("{}/api/loans/{id}", cli.url))
                .header("Authorization", bearer(&session))
                .json(&json!({ "status": status }))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::DeleteLoan { id } => {
            let session = load_session()?;
            let res = client
                .delete(format!("{}/api/loans/{id}", cli.url))
                .header("Authorization", bearer(&session))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::Users => {
            let session = load_session()?;
            let res = client
                .get(format!("{}/api/users", cli.url))
                .header("Authorization", bearer(&session))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::Block { id } => {
            let session = load_session()?;
            let res = client
                .patch(format!("{}/api/users/{id}", cli.url))
                .header("Authorization", bearer(&session))
                .json(&json!({ "blocked": true }))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::Unblock { id } => {
            let session = load_session()?;
            let res = client
                .patch(format!("{}/api/users/{id}", cli.url))
                .header("Authorization", bearer(&session))
                .json(&json!({ "blocked": false }))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::Counts { watch } => {
            let session = load_session()?;
            loop {
                let res = client
                    .get(format!("{}/api/loans/counts", cli.url))
                    .header("Authorization", bearer(&session))
                    .send()
                    .await?;
                println!("{}", res.text().await?);
                match watch {
                    Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                    None => break,
                }
            }
        }
    }

    Ok(())
}
