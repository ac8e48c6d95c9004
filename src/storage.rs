//! Record store over Sled.
//!
//! One tree per entity (users, centers, members, loans) plus a unique email
//! index for login. Values are Serde-serialized JSON documents keyed by
//! opaque ids; listing walks the tree and filters, which is plenty at branch
//! scale. Loans are immutable after insert except for the status column.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{Center, Loan, LoanStatus, Member, User};

#[derive(Clone)]
pub struct Storage {
    #[allow(dead_code)] // db kept for future ops like flush/close on Sled
    db: Db,
    user_tree: Tree,
    email_tree: Tree, // lowercased email -> user id
    center_tree: Tree,
    member_tree: Tree,
    loan_tree: Tree,
}

impl Storage {
    /// Open or create the Sled database at the given path.
    pub fn open(path: &str) -> ApiResult<Self> {
        let db = sled::open(path)?;
        let user_tree = db.open_tree("users")?;
        let email_tree = db.open_tree("users_by_email")?;
        let center_tree = db.open_tree("centers")?;
        let member_tree = db.open_tree("members")?;
        let loan_tree = db.open_tree("loans")?;
        Ok(Self {
            db,
            user_tree,
            email_tree,
            center_tree,
            member_tree,
            loan_tree,
        })
    }

    fn put<T: Serialize>(tree: &Tree, key: &str, value: &T) -> ApiResult<()> {
        let bytes = serde_json::to_vec(value)?;
        tree.insert(key.as_bytes(), bytes)?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(tree: &Tree, key: &str) -> ApiResult<Option<T>> {
        match tree.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(tree: &Tree) -> ApiResult<Vec<T>> {
        let mut out = Vec::new();
        for item in tree.iter() {
            let (_, bytes) = item?;
            out.push(serde_json::from_slice(&bytes)?);
        }
        Ok(out)
    }

    // --- Users ---

    /// Create a user; the email is lowercased and must be unique.
    pub fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        is_admin: bool,
    ) -> ApiResult<User> {
        let email = email.to_lowercase();
        if self.email_tree.get(email.as_bytes())?.is_some() {
            return Err(ApiError::Conflict("Email already exists".to_string()));
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: email.clone(),
            password_hash: password_hash.to_string(),
            is_admin,
            blocked: false,
        };
        Self::put(&self.user_tree, &user.id, &user)?;
        self.email_tree
            .insert(email.as_bytes(), user.id.as_bytes())?;
        Ok(user)
    }

    pub fn get_user(&self, id: &str) -> ApiResult<Option<User>> {
        Self::get(&self.user_tree, id)
    }

    pub fn get_user_by_email(&self, email: &str) -> ApiResult<Option<User>> {
        let email = email.to_lowercase();
        match self.email_tree.get(email.as_bytes())? {
            Some(id_bytes) => {
                let id = String::from_utf8_lossy(&id_bytes).to_string();
                self.get_user(&id)
            }
            None => Ok(None),
        }
    }

    pub fn list_users(&self) -> ApiResult<Vec<User>> {
        Self::scan(&self.user_tree)
    }

    pub fn set_user_blocked(&self, id: &str, blocked: bool) -> ApiResult<User> {
        let mut user = self
            .get_user(id)?
            .ok_or_else(|| ApiError::NotFound("user".to_string()))?;
        user.blocked = blocked;
        Self::put(&self.user_tree, id, &user)?;
        Ok(user)
    }

    // --- Centers ---

    /// Create a center; names are unique (trimmed, case-insensitive).
    pub fn create_center(&self, name: &str) -> ApiResult<Center> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::BadRequest("Center name required".to_string()));
        }
        let clash = self
            .list_centers()?
            .into_iter()
            .any(|c| c.name.eq_ignore_ascii_case(name));
        if clash {
            return Err(ApiError::Conflict("Center name already exists".to_string()));
        }

        let center = Center {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
        };
        Self::put(&self.center_tree, &center.id, &center)?;
        Ok(center)
    }

    pub fn get_center(&self, id: &str) -> ApiResult<Option<Center>> {
        Self::get(&self.center_tree, id)
    }

    pub fn list_centers(&self) -> ApiResult<Vec<Center>> {
        Self::scan(&self.center_tree)
    }

    // --- Members ---

    pub fn create_member(
        &self,
        center_id: &str,
        name: &str,
        member_cibil: Option<String>,
        dateofbirth: Option<String>,
        gender: Option<String>,
    ) -> ApiResult<Member> {
        if self.get_center(center_id)?.is_none() {
            return Err(ApiError::NotFound("center".to_string()));
        }
        if name.trim().is_empty() {
            return Err(ApiError::BadRequest("Member name required".to_string()));
        }

        let member = Member {
            id: Uuid::new_v4().to_string(),
            center_id: center_id.to_string(),
            name: name.trim().to_string(),
            member_cibil,
            dateofbirth,
            gender,
        };
        Self::put(&self.member_tree, &member.id, &member)?;
        Ok(member)
    }

    pub fn get_member(&self, id: &str) -> ApiResult<Option<Member>> {
        Self::get(&self.member_tree, id)
    }

    pub fn members_in_center(&self, center_id: &str) -> ApiResult<Vec<Member>> {
        let mut members: Vec<Member> = Self::scan(&self.member_tree)?;
        members.retain(|m| m.center_id == center_id);
        Ok(members)
    }

    // --- Loans ---

    /// Insert a fully assembled loan record as a single document.
    pub fn insert_loan(&self, loan: &Loan) -> ApiResult<()> {
        Self::put(&self.loan_tree, &loan.id, loan)
    }

    pub fn get_loan(&self, id: &str) -> ApiResult<Option<Loan>> {
        Self::get(&self.loan_tree, id)
    }

    /// All loans, newest first.
    pub fn list_loans(&self) -> ApiResult<Vec<Loan>> {
        let mut loans: Vec<Loan> = Self::scan(&self.loan_tree)?;
        loans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(loans)
    }

    pub fn loans_for_user(&self, user_id: &str) -> ApiResult<Vec<Loan>> {
        let mut loans = self.list_loans()?;
        loans.retain(|l| l.user_id == user_id);
        Ok(loans)
    }

    pub fn count_loans_with_status(&self, status: LoanStatus) -> ApiResult<usize> {
        Ok(self
            .list_loans()?
            .into_iter()
            .filter(|l| l.status == status)
            .count())
    }

    /// Move a loan through its lifecycle. Illegal transitions are rejected,
    /// the record is otherwise untouched.
    pub fn update_loan_status(&self, id: &str, status: LoanStatus) -> ApiResult<Loan> {
        let mut loan = self
            .get_loan(id)?
            .ok_or_else(|| ApiError::NotFound("loan".to_string()))?;
        if !loan.status.can_transition_to(status) {
            return Err(ApiError::BadRequest(format!(
                "cannot move loan from {} to {}",
                loan.status, status
            )));
        }
        loan.status = status;
        Self::put(&self.loan_tree, id, &loan)?;
        Ok(loan)
    }

    pub fn delete_loan(&self, id: &str) -> ApiResult<()> {
        let removed = self.loan_tree.remove(id.as_bytes())?;
        if removed.is_none() {
            return Err(ApiError::NotFound("loan".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentPaths, DocumentSlot};
    use chrono::{Duration, Utc};
    use std::fs;

    fn open_temp(name: &str) -> (Storage, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&dir); // Clean up previous test data
        let storage = Storage::open(dir.to_str().unwrap()).expect("open storage");
        (storage, dir)
    }

    fn sample_loan(id: &str, loan_id: &str, user_id: &str) -> Loan {
        let mut documents = DocumentPaths::default();
        for slot in DocumentSlot::ALL {
            documents.set(slot, format!("loans/{}/{}-x.jpg", loan_id, slot.field_name()));
        }
        Loan {
            id: id.to_string(),
            loan_id: loan_id.to_string(),
            user_id: user_id.to_string(),
            center_id: "c1".to_string(),
            member_id: "m1".to_string(),
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
            documents,
            status: LoanStatus::Pending,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_user_create_and_lookup_by_email() {
        let (storage, dir) = open_temp("loan_intake_test_users");

        let user = storage
            .create_user("Field Agent", "Agent@Example.com", "hash", false)
            .unwrap();
        assert_eq!(user.email, "agent@example.com");
        assert!(!user.blocked);

        // Lookup is case-insensitive because the index stores lowercase.
        let found = storage.get_user_by_email("AGENT@example.COM").unwrap();
        assert_eq!(found.unwrap().id, user.id);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_duplicate_email_is_a_conflict() {
        let (storage, dir) = open_temp("loan_intake_test_dup_email");

        storage
            .create_user("One", "agent@example.com", "hash", false)
            .unwrap();
        let err = storage
            .create_user("Two", "AGENT@example.com", "hash", false)
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_block_and_unblock_user() {
        let (storage, dir) = open_temp("loan_intake_test_block");

        let user = storage
            .create_user("Agent", "a@example.com", "hash", false)
            .unwrap();
        let blocked = storage.set_user_blocked(&user.id, true).unwrap();
        assert!(blocked.blocked);
        let unblocked = storage.set_user_blocked(&user.id, false).unwrap();
        assert!(!unblocked.blocked);

        assert!(matches!(
            storage.set_user_blocked("missing", true),
            Err(ApiError::NotFound(_))
        ));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_center_names_are_unique() {
        let (storage, dir) = open_temp("loan_intake_test_centers");

        storage.create_center("Salem North").unwrap();
        let err = storage.create_center("  salem north ").unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(storage.list_centers().unwrap().len(), 1);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_members_listed_per_center() {
        let (storage, dir) = open_temp("loan_intake_test_members");

        let c1 = storage.create_center("Salem North").unwrap();
        let c2 = storage.create_center("Salem South").unwrap();
        storage
            .create_member(&c1.id, "Lakshmi", None, None, None)
            .unwrap();
        storage
            .create_member(&c1.id, "Meena", None, None, None)
            .unwrap();
        storage
            .create_member(&c2.id, "Priya", None, None, None)
            .unwrap();

        assert_eq!(storage.members_in_center(&c1.id).unwrap().len(), 2);
        assert_eq!(storage.members_in_center(&c2.id).unwrap().len(), 1);

        // Member creation requires an existing center.
        assert!(matches!(
            storage.create_member("nope", "Ghost", None, None, None),
            Err(ApiError::NotFound(_))
        ));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_loans_listed_newest_first_and_per_user() {
        let (storage, dir) = open_temp("loan_intake_test_loans");

        let mut older = sample_loan("l1", "LN-1001", "u1");
        older.created_at = Utc::now() - Duration::minutes(5);
        let newer = sample_loan("l2", "LN-1002", "u2");
        storage.insert_loan(&older).unwrap();
        storage.insert_loan(&newer).unwrap();

        let all = storage.list_loans().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].loan_id, "LN-1002");

        let mine = storage.loans_for_user("u1").unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].loan_id, "LN-1001");

        assert_eq!(
            storage.count_loans_with_status(LoanStatus::Pending).unwrap(),
            2
        );

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_status_lifecycle_enforced() {
        let (storage, dir) = open_temp("loan_intake_test_status");

        let loan = sample_loan("l1", "LN-1001", "u1");
        storage.insert_loan(&loan).unwrap();

        // PENDING -> CREDITED is not reachable directly.
        assert!(matches!(
            storage.update_loan_status("l1", LoanStatus::Credited),
            Err(ApiError::BadRequest(_))
        ));

        let approved = storage
            .update_loan_status("l1", LoanStatus::Approved)
            .unwrap();
        assert_eq!(approved.status, LoanStatus::Approved);

        // Approved loans cannot be rejected anymore.
        assert!(matches!(
            storage.update_loan_status("l1", LoanStatus::Rejected),
            Err(ApiError::BadRequest(_))
        ));

        let credited = storage
            .update_loan_status("l1", LoanStatus::Credited)
            .unwrap();
        assert_eq!(credited.status, LoanStatus::Credited);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_delete_loan() {
        let (storage, dir) = open_temp("loan_intake_test_delete");

        storage
            .insert_loan(&sample_loan("l1", "LN-1001", "u1"))
            .unwrap();
        storage.delete_loan("l1").unwrap();
        assert!(storage.get_loan("l1").unwrap().is_none());
        assert!(matches!(
            storage.delete_loan("l1"),
            Err(ApiError::NotFound(_))
        ));

        let _ = fs::remove_dir_all(dir);
    }
}
