use chrono::{Datelike, NaiveDate};

use crate::errors::VoteError;
use crate::model::{ElectionDraft, NewCandidate, PersonalInfo};

pub const MINIMUM_AGE: u32 = 18;

/// Lower-cased wallet address used for uniqueness and admin checks.
pub fn wallet_key(wallet: &str) -> String {
    wallet.trim().to_lowercase()
}

pub fn same_wallet(a: &str, b: &str) -> bool {
    wallet_key(a) == wallet_key(b)
}

/// `0x` followed by 40 hex digits.
pub fn validate_wallet(wallet: &str) -> Result<(), VoteError> {
    require(wallet, "walletAddress")?;
    let wallet = wallet.trim();
    let digits = match wallet.get(..2) {
        Some(prefix) if prefix.eq_ignore_ascii_case("0x") => &wallet[2..],
        _ => return Err(VoteError::InvalidWallet(wallet.to_owned())),
    };
    if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(VoteError::InvalidWallet(wallet.to_owned()));
    }
    Ok(())
}

/// Something of the form `a@b.c` with no whitespace.
fn validate_email(email: &str) -> Result<(), VoteError> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !email.chars().any(char::is_whitespace)
                && domain
                    .split_once('.')
                    .map_or(false, |(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    };
    if !valid {
        return Err(VoteError::InvalidEmail);
    }
    Ok(())
}

fn require(value: &str, field: &'static str) -> Result<(), VoteError> {
    if value.trim().is_empty() {
        return Err(VoteError::MissingField(field));
    }
    Ok(())
}

pub fn validate_election(draft: &ElectionDraft) -> Result<(), VoteError> {
    require(&draft.title, "title")?;
    if draft.start_time >= draft.end_time {
        return Err(VoteError::InvalidSchedule);
    }
    Ok(())
}

pub fn validate_candidate(candidate: &NewCandidate) -> Result<(), VoteError> {
    require(&candidate.name, "name")?;
    require(&candidate.party, "party")?;
    Ok(())
}

pub fn validate_registration(
    wallet: &str,
    info: &PersonalInfo,
    today: NaiveDate,
) -> Result<(), VoteError> {
    validate_wallet(wallet)?;
    require(&info.full_name, "fullName")?;
    require(&info.national_id, "nationalId")?;
    require(&info.email, "email")?;
    validate_email(&info.email)?;
    require(&info.phone_number, "phoneNumber")?;
    require(&info.address, "address")?;
    let born = info.date_of_birth.ok_or(VoteError::MissingField("dateOfBirth"))?;
    if age_on(born, today) < MINIMUM_AGE as i32 {
        return Err(VoteError::Underage(MINIMUM_AGE));
    }
    Ok(())
}

/// Completed years between `born` and `today`.
pub fn age_on(born: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - born.year();
    if (today.month(), today.day()) < (born.month(), born.day()) {
        age -= 1;
    }
    age
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn info(born: Option<NaiveDate>) -> PersonalInfo {
        PersonalInfo {
            full_name: "Sam Doe".into(),
            national_id: "ID-42".into(),
            phone_number: "+1 555 0100".into(),
            email: "sam@example.org".into(),
            address: "1 Main Street".into(),
            date_of_birth: born,
        }
    }

    const WALLET: &str = "0x64E01a30a963206345bE12DEcEcDA08d78c9a2a5";

    #[test]
    fn ages() {
        assert_eq!(age_on(date(2000, 6, 15), date(2018, 6, 14)), 17);
        assert_eq!(age_on(date(2000, 6, 15), date(2018, 6, 15)), 18);
        assert_eq!(age_on(date(2000, 2, 29), date(2018, 2, 28)), 17);
    }

    #[test]
    fn registration_rules() {
        let today = date(2024, 1, 10);
        assert!(validate_registration(WALLET, &info(Some(date(1990, 1, 1))), today).is_ok());
        assert!(matches!(
            validate_registration(WALLET, &info(Some(date(2010, 1, 1))), today),
            Err(VoteError::Underage(18))
        ));
        assert!(matches!(
            validate_registration(WALLET, &info(None), today),
            Err(VoteError::MissingField("dateOfBirth"))
        ));
        assert!(matches!(
            validate_registration("  ", &info(Some(date(1990, 1, 1))), today),
            Err(VoteError::MissingField("walletAddress"))
        ));
        assert!(matches!(
            validate_registration("0xV", &info(Some(date(1990, 1, 1))), today),
            Err(VoteError::InvalidWallet(_))
        ));
    }

    #[test]
    fn registration_contact_details() {
        let today = date(2024, 1, 10);
        let mut i = info(Some(date(1990, 1, 1)));
        i.email = "sam at example".into();
        assert!(matches!(validate_registration(WALLET, &i, today), Err(VoteError::InvalidEmail)));
        i.email = "sam@example".into();
        assert!(matches!(validate_registration(WALLET, &i, today), Err(VoteError::InvalidEmail)));
        i.email = "sam@example.org".into();
        i.phone_number.clear();
        assert!(matches!(
            validate_registration(WALLET, &i, today),
            Err(VoteError::MissingField("phoneNumber"))
        ));
        i.phone_number = "555".into();
        i.address = " ".into();
        assert!(matches!(
            validate_registration(WALLET, &i, today),
            Err(VoteError::MissingField("address"))
        ));
    }

    #[test]
    fn wallet_format() {
        assert!(validate_wallet(WALLET).is_ok());
        assert!(validate_wallet("0X64E01A30A963206345BE12DECECDA08D78C9A2A5").is_ok());
        assert!(validate_wallet(" 0x0000000000000000000000000000000000000001 ").is_ok());
        for bad in ["0x1234...5678", "64E01a30a963206345bE12DEcEcDA08d78c9a2a5aa", "0x64E01a30a963206345bE12DEcEcDA08d78c9a2a", "0xZ4E01a30a963206345bE12DEcEcDA08d78c9a2a5", "0x"] {
            assert!(matches!(validate_wallet(bad), Err(VoteError::InvalidWallet(_))), "{bad}");
        }
    }

    #[test]
    fn candidate_rules() {
        let mut c = NewCandidate {
            name: "Jordan Casey".into(),
            party: " ".into(),
            ..Default::default()
        };
        assert!(matches!(validate_candidate(&c), Err(VoteError::MissingField("party"))));
        c.party = "Independent".into();
        assert!(validate_candidate(&c).is_ok());
    }

    #[test]
    fn election_rules() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let mut draft = ElectionDraft {
            title: "General".into(),
            description: String::new(),
            start_time: start,
            end_time: start,
        };
        assert!(matches!(validate_election(&draft), Err(VoteError::InvalidSchedule)));
        draft.end_time = start + chrono::Duration::days(3);
        assert!(validate_election(&draft).is_ok());
        draft.title.clear();
        assert!(matches!(validate_election(&draft), Err(VoteError::MissingField("title"))));
    }

    #[test]
    fn wallets_compare_case_insensitively() {
        assert!(same_wallet("0xABCdef", " 0xabcDEF"));
        assert!(!same_wallet("0xabc", "0xabd"));
    }
}
