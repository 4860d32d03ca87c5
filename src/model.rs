//! Closed status sets shared across the core. Each one is stored as its
//! lowercase text in SQLite and travels the wire in the same form.

use serde::Deserialize;

use crate::error::{ErpError, ErpResult};

text_enum! {
    pub enum UserType {
        Admin => "admin",
        Student => "student",
        Lecturer => "lecturer",
        Staff => "staff",
        Registrar => "registrar",
        Dean => "dean",
        Hod => "hod",
        HostelWarden => "hostel_warden",
        Professor => "professor",
    }
}

text_enum! {
    pub enum Gender {
        Male => "male",
        Female => "female",
        Other => "other",
    }
}

text_enum! {
    pub enum StudentStatus {
        Active => "active",
        Graduated => "graduated",
        Deferred => "deferred",
        Suspended => "suspended",
        Discontinued => "discontinued",
        Expelled => "expelled",
        OnLeave => "on_leave",
        Inactive => "inactive",
    }
}

text_enum! {
    pub enum SponsorType {
        Government => "government",
        SelfSponsored => "self",
        Employer => "employer",
        Scholarship => "scholarship",
        Bursary => "bursary",
        Loan => "loan",
    }
}

impl SponsorType {
    /// Sponsors whose students count as fee-cleared for progression.
    pub fn clears_fees(self) -> bool {
        matches!(
            self,
            SponsorType::Scholarship | SponsorType::Bursary | SponsorType::Government
        )
    }
}

text_enum! {
    pub enum PaymentMethod {
        Mpesa => "mpesa",
        BankTransfer => "bank_transfer",
        Cash => "cash",
        Cheque => "cheque",
        BankersCheque => "bankers_cheque",
        Online => "online",
        Card => "card",
        MobileMoney => "mobile_money",
    }
}

text_enum! {
    pub enum PaymentStatus {
        Pending => "pending",
        Completed => "completed",
        Failed => "failed",
        Refunded => "refunded",
    }
}

impl PaymentStatus {
    pub fn can_become(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Completed) | (Pending, Failed) | (Completed, Refunded)
        )
    }
}

text_enum! {
    /// How a fee payment row came out of one `record_payment` call.
    pub enum Allocation {
        Direct => "direct",
        Forwarded => "forwarded",
        Credit => "credit",
    }
}

text_enum! {
    pub enum HostelType {
        Boys => "boys",
        Girls => "girls",
    }
}

impl HostelType {
    pub fn admits(self, gender: Option<Gender>) -> bool {
        matches!(
            (self, gender),
            (HostelType::Boys, Some(Gender::Male)) | (HostelType::Girls, Some(Gender::Female))
        )
    }
}

text_enum! {
    pub enum MaintenanceStatus {
        Good => "good",
        NeedsRepair => "needs_repair",
        UnderMaintenance => "under_maintenance",
        OutOfOrder => "out_of_order",
    }
}

impl MaintenanceStatus {
    pub fn bookable(self) -> bool {
        matches!(self, MaintenanceStatus::Good | MaintenanceStatus::NeedsRepair)
    }
}

text_enum! {
    pub enum BookingStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Cancelled => "cancelled",
        CheckedIn => "checked_in",
        CheckedOut => "checked_out",
    }
}

impl BookingStatus {
    /// Statuses in which the booking holds its bed.
    pub fn holds_bed(self) -> bool {
        matches!(self, BookingStatus::Approved | BookingStatus::CheckedIn)
    }

    pub fn can_become(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Approved, Cancelled)
                | (Approved, CheckedIn)
                | (CheckedIn, CheckedOut)
        )
    }
}

text_enum! {
    pub enum HostelPaymentStatus {
        Pending => "pending",
        Partial => "partial",
        Paid => "paid",
        Refunded => "refunded",
    }
}

text_enum! {
    pub enum DayOfWeek {
        Monday => "monday",
        Tuesday => "tuesday",
        Wednesday => "wednesday",
        Thursday => "thursday",
        Friday => "friday",
        Saturday => "saturday",
        Sunday => "sunday",
    }
}

text_enum! {
    pub enum AttendanceStatus {
        Present => "present",
        Absent => "absent",
        Late => "late",
        Excused => "excused",
    }
}

text_enum! {
    pub enum SubmissionFormat {
        Pdf => "pdf",
        Doc => "doc",
        Any => "any",
        Code => "code",
        Presentation => "presentation",
    }
}

impl SubmissionFormat {
    pub fn accepts(self, filename: &str) -> bool {
        let ext = match filename.rsplit_once('.') {
            Some((_, ext)) => ext.to_ascii_lowercase(),
            None => return self == SubmissionFormat::Any,
        };
        let allowed: &[&str] = match self {
            SubmissionFormat::Any => return true,
            SubmissionFormat::Pdf => &["pdf"],
            SubmissionFormat::Doc => &["doc", "docx"],
            SubmissionFormat::Code => &[
                "zip", "py", "java", "cpp", "c", "h", "js", "ts", "rs", "html", "css", "txt",
            ],
            SubmissionFormat::Presentation => &["ppt", "pptx", "pdf"],
        };
        allowed.contains(&ext.as_str())
    }
}

text_enum! {
    pub enum SubmissionStatus {
        Submitted => "submitted",
        Late => "late",
    }
}

text_enum! {
    pub enum GradingStatus {
        Pending => "pending",
        Graded => "graded",
        Returned => "returned",
    }
}

text_enum! {
    pub enum NotificationKind {
        Promoted => "promoted",
        NotPromoted => "not_promoted",
        Graduated => "graduated",
    }
}

text_enum! {
    pub enum ResourceType {
        Book => "book",
        Journal => "journal",
        Ebook => "ebook",
        Thesis => "thesis",
        Reference => "reference",
        Multimedia => "multimedia",
        Database => "database",
    }
}

text_enum! {
    pub enum LoanStatus {
        Active => "active",
        Returned => "returned",
    }
}

/// The authenticated caller, as vouched for by the HTTP collaborator.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub user_id: String,
    pub user_type: UserType,
    #[serde(default)]
    pub linked_profile: Option<String>,
}

impl Principal {
    /// The lecturer profile this principal acts as.
    pub fn lecturer_id(&self) -> ErpResult<&str> {
        match self.user_type {
            UserType::Lecturer | UserType::Professor => {
                self.linked_profile.as_deref().ok_or_else(|| {
                    ErpError::PermissionDenied("principal has no lecturer profile".to_string())
                })
            }
            other => Err(ErpError::PermissionDenied(format!(
                "{other} accounts cannot act as a lecturer"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booking_lifecycle_edges() {
        use BookingStatus::*;
        assert!(Pending.can_become(Approved));
        assert!(Approved.can_become(Cancelled));
        assert!(!Pending.can_become(CheckedIn));
        assert!(!CheckedOut.can_become(CheckedIn));
        assert!(!Rejected.can_become(Approved));
    }

    #[test]
    fn submission_formats_check_extension() {
        assert!(SubmissionFormat::Pdf.accepts("report.PDF"));
        assert!(!SubmissionFormat::Pdf.accepts("report.docx"));
        assert!(SubmissionFormat::Doc.accepts("essay.docx"));
        assert!(SubmissionFormat::Any.accepts("README"));
        assert!(!SubmissionFormat::Code.accepts("slides.pptx"));
    }

    #[test]
    fn text_round_trip_and_unknown_value() {
        assert_eq!("on_leave".parse::<StudentStatus>().ok(), Some(StudentStatus::OnLeave));
        assert_eq!(SponsorType::SelfSponsored.to_string(), "self");
        let e = "enrolled".parse::<StudentStatus>().expect_err("unknown status");
        assert_eq!(e.code(), "validation_error");
    }

    #[test]
    fn only_lecturers_act_as_lecturers() {
        let p = Principal {
            user_id: "u1".into(),
            user_type: UserType::Student,
            linked_profile: Some("s1".into()),
        };
        assert_eq!(p.lecturer_id().expect_err("student").kind(), "PermissionDenied");
        let p = Principal {
            user_type: UserType::Professor,
            ..p
        };
        assert_eq!(p.lecturer_id().expect("professor"), "s1");
    }
}
