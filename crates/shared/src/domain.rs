use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of fields that count towards the accuracy metric.
pub const TRACKABLE_FIELD_COUNT: usize = 10;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(FileId);
id_newtype!(ExtractionId);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Upload,
    Extracting,
    Verify,
    Complete,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Upload => "upload",
            Stage::Extracting => "extracting",
            Stage::Verify => "verify",
            Stage::Complete => "complete",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyField {
    PolicyHolder,
    PolicyNumber,
    InsurerName,
    SumInsured,
    CommencingDate,
    ExpiringDate,
    PremiumAmount,
    PaidAmount,
    BalanceAmount,
    PolicyType,
    RegistrationNo,
    Contact,
    VehicleType,
}

impl PolicyField {
    pub const ALL: [PolicyField; 13] = [
        PolicyField::PolicyHolder,
        PolicyField::PolicyNumber,
        PolicyField::InsurerName,
        PolicyField::SumInsured,
        PolicyField::CommencingDate,
        PolicyField::ExpiringDate,
        PolicyField::PremiumAmount,
        PolicyField::PaidAmount,
        PolicyField::BalanceAmount,
        PolicyField::PolicyType,
        PolicyField::RegistrationNo,
        PolicyField::Contact,
        PolicyField::VehicleType,
    ];

    /// Fields shown on the verification form, in form order.
    pub fn trackable() -> impl Iterator<Item = PolicyField> {
        Self::ALL.into_iter().filter(|field| field.is_trackable())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PolicyField::PolicyHolder => "policy_holder",
            PolicyField::PolicyNumber => "policy_number",
            PolicyField::InsurerName => "insurer_name",
            PolicyField::SumInsured => "sum_insured",
            PolicyField::CommencingDate => "commencing_date",
            PolicyField::ExpiringDate => "expiring_date",
            PolicyField::PremiumAmount => "premium_amount",
            PolicyField::PaidAmount => "paid_amount",
            PolicyField::BalanceAmount => "balance_amount",
            PolicyField::PolicyType => "policy_type",
            PolicyField::RegistrationNo => "registration_no",
            PolicyField::Contact => "contact",
            PolicyField::VehicleType => "vehicle_type",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PolicyField::PolicyHolder => "Policy Holder",
            PolicyField::PolicyNumber => "Policy Number",
            PolicyField::InsurerName => "Insurer Name",
            PolicyField::SumInsured => "Sum Insured",
            PolicyField::CommencingDate => "Commencing Date",
            PolicyField::ExpiringDate => "Expiring Date",
            PolicyField::PremiumAmount => "Premium Amount",
            PolicyField::PaidAmount => "Paid Amount",
            PolicyField::BalanceAmount => "Balance Amount",
            PolicyField::PolicyType => "Policy Type",
            PolicyField::RegistrationNo => "Registration No",
            PolicyField::Contact => "Contact",
            PolicyField::VehicleType => "Vehicle Type",
        }
    }

    pub fn is_trackable(self) -> bool {
        !matches!(
            self,
            PolicyField::RegistrationNo | PolicyField::Contact | PolicyField::VehicleType
        )
    }

    pub fn is_date(self) -> bool {
        matches!(self, PolicyField::CommencingDate | PolicyField::ExpiringDate)
    }

    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|field| field.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for PolicyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extracted policy data. Every field is independently optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRecord {
    #[serde(default)]
    pub policy_holder: Option<String>,
    #[serde(default)]
    pub policy_number: Option<String>,
    #[serde(default)]
    pub insurer_name: Option<String>,
    #[serde(default)]
    pub sum_insured: Option<String>,
    #[serde(default)]
    pub commencing_date: Option<String>,
    #[serde(default)]
    pub expiring_date: Option<String>,
    #[serde(default)]
    pub premium_amount: Option<String>,
    #[serde(default)]
    pub paid_amount: Option<String>,
    #[serde(default)]
    pub balance_amount: Option<String>,
    #[serde(default)]
    pub policy_type: Option<String>,
    #[serde(default)]
    pub registration_no: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub vehicle_type: Option<String>,
}

impl PolicyRecord {
    pub fn get(&self, field: PolicyField) -> Option<&str> {
        self.slot(field).as_deref()
    }

    pub fn set(&mut self, field: PolicyField, value: impl Into<String>) {
        *self.slot_mut(field) = Some(value.into());
    }

    /// A field counts as populated when it holds a non-empty value.
    pub fn is_populated(&self, field: PolicyField) -> bool {
        self.get(field).is_some_and(|value| !value.is_empty())
    }

    pub fn populated_trackable_count(&self) -> usize {
        PolicyField::trackable()
            .filter(|field| self.is_populated(*field))
            .count()
    }

    fn slot(&self, field: PolicyField) -> &Option<String> {
        match field {
            PolicyField::PolicyHolder => &self.policy_holder,
            PolicyField::PolicyNumber => &self.policy_number,
            PolicyField::InsurerName => &self.insurer_name,
            PolicyField::SumInsured => &self.sum_insured,
            PolicyField::CommencingDate => &self.commencing_date,
            PolicyField::ExpiringDate => &self.expiring_date,
            PolicyField::PremiumAmount => &self.premium_amount,
            PolicyField::PaidAmount => &self.paid_amount,
            PolicyField::BalanceAmount => &self.balance_amount,
            PolicyField::PolicyType => &self.policy_type,
            PolicyField::RegistrationNo => &self.registration_no,
            PolicyField::Contact => &self.contact,
            PolicyField::VehicleType => &self.vehicle_type,
        }
    }

    fn slot_mut(&mut self, field: PolicyField) -> &mut Option<String> {
        match field {
            PolicyField::PolicyHolder => &mut self.policy_holder,
            PolicyField::PolicyNumber => &mut self.policy_number,
            PolicyField::InsurerName => &mut self.insurer_name,
            PolicyField::SumInsured => &mut self.sum_insured,
            PolicyField::CommencingDate => &mut self.commencing_date,
            PolicyField::ExpiringDate => &mut self.expiring_date,
            PolicyField::PremiumAmount => &mut self.premium_amount,
            PolicyField::PaidAmount => &mut self.paid_amount,
            PolicyField::BalanceAmount => &mut self.balance_amount,
            PolicyField::PolicyType => &mut self.policy_type,
            PolicyField::RegistrationNo => &mut self.registration_no,
            PolicyField::Contact => &mut self.contact,
            PolicyField::VehicleType => &mut self.vehicle_type,
        }
    }
}
