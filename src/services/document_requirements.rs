/*!
 * # Document Requirements
 *
 * Maps a purchase type and credit-application flag onto the document
 * categories a supplier must (and may) upload. Everything here is pure.
 */

use std::collections::BTreeSet;
use strum::IntoEnumIterator;

use crate::entities::enums::PurchaseType;
use crate::models::DocumentCategory;

use DocumentCategory::*;

const ONCE_OFF_MANDATORY: &[DocumentCategory] = &[BankConfirmation, CompanyRegistration];

const REGULAR_MANDATORY: &[DocumentCategory] = &[
    CompanyRegistration,
    BbbeeAccreditation,
    TaxClearance,
    BankConfirmation,
];

const OPTIONAL: &[DocumentCategory] = &[
    CompanyProfile,
    Organogram,
    QualityCert,
    HealthSafety,
    Cm29Directors,
    ShareholderCerts,
    ProofOfShareholding,
    BbbeeScorecard,
    VatCertificate,
    SectorRegistrations,
];

/// Categories that must be present before a submission counts as complete.
pub fn mandatory_documents(
    purchase_type: PurchaseType,
    credit_application: bool,
) -> BTreeSet<DocumentCategory> {
    let mut docs: BTreeSet<DocumentCategory> = match purchase_type {
        PurchaseType::OnceOff => ONCE_OFF_MANDATORY.iter().copied().collect(),
        PurchaseType::Regular => REGULAR_MANDATORY.iter().copied().collect(),
        PurchaseType::SharedIp => REGULAR_MANDATORY
            .iter()
            .copied()
            .chain(std::iter::once(Nda))
            .collect(),
    };
    if credit_application {
        docs.insert(CreditApplication);
    }
    docs
}

/// Full checklist shown to the supplier on the form, in display order.
pub fn required_documents(
    purchase_type: PurchaseType,
    credit_application: bool,
) -> Vec<DocumentCategory> {
    let mandatory = mandatory_documents(purchase_type, credit_application);
    DocumentCategory::iter()
        .filter(|category| match category {
            CreditApplication => credit_application,
            _ => match purchase_type {
                PurchaseType::OnceOff => mandatory.contains(category),
                PurchaseType::Regular => *category != Nda,
                PurchaseType::SharedIp => true,
            },
        })
        .collect()
}

/// Optional categories counted towards completeness insights.
pub fn optional_documents(
    purchase_type: PurchaseType,
    credit_application: bool,
) -> Vec<DocumentCategory> {
    let mandatory = mandatory_documents(purchase_type, credit_application);
    OPTIONAL
        .iter()
        .copied()
        .filter(|category| !mandatory.contains(category))
        .collect()
}

/// Whether `category` is covered by what was uploaded. A tax clearance
/// certificate may be substituted by a letter of good standing.
pub fn is_satisfied(category: DocumentCategory, uploaded: &BTreeSet<DocumentCategory>) -> bool {
    match category {
        TaxClearance => uploaded.contains(&TaxClearance) || uploaded.contains(&GoodStanding),
        other => uploaded.contains(&other),
    }
}

pub fn missing_mandatory(
    purchase_type: PurchaseType,
    credit_application: bool,
    uploaded: &BTreeSet<DocumentCategory>,
) -> Vec<DocumentCategory> {
    mandatory_documents(purchase_type, credit_application)
        .into_iter()
        .filter(|category| !is_satisfied(*category, uploaded))
        .collect()
}

/// Best guess at the purchase type when a supplier has no initiation.
pub fn infer_purchase_type(uploaded: &BTreeSet<DocumentCategory>) -> PurchaseType {
    if uploaded.contains(&Nda) {
        PurchaseType::SharedIp
    } else if uploaded.len() <= 2
        && uploaded.contains(&BankConfirmation)
        && uploaded.contains(&CompanyRegistration)
    {
        PurchaseType::OnceOff
    } else {
        PurchaseType::Regular
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    fn set(categories: &[DocumentCategory]) -> BTreeSet<DocumentCategory> {
        categories.iter().copied().collect()
    }

    fn purchase_type() -> impl Strategy<Value = PurchaseType> {
        prop_oneof![
            Just(PurchaseType::Regular),
            Just(PurchaseType::OnceOff),
            Just(PurchaseType::SharedIp),
        ]
    }

    #[test_case(PurchaseType::OnceOff, false, 2)]
    #[test_case(PurchaseType::OnceOff, true, 3)]
    #[test_case(PurchaseType::Regular, false, 4)]
    #[test_case(PurchaseType::SharedIp, false, 5)]
    #[test_case(PurchaseType::SharedIp, true, 6)]
    fn mandatory_set_sizes(pt: PurchaseType, credit: bool, expected: usize) {
        assert_eq!(mandatory_documents(pt, credit).len(), expected);
    }

    #[test]
    fn good_standing_satisfies_tax_requirement() {
        let uploaded = set(&[
            CompanyRegistration,
            BbbeeAccreditation,
            GoodStanding,
            BankConfirmation,
        ]);
        assert!(missing_mandatory(PurchaseType::Regular, false, &uploaded).is_empty());
    }

    #[test]
    fn neither_tax_document_is_missing() {
        let uploaded = set(&[CompanyRegistration, BbbeeAccreditation, BankConfirmation]);
        assert_eq!(
            missing_mandatory(PurchaseType::Regular, false, &uploaded),
            vec![TaxClearance]
        );
    }

    #[test]
    fn credit_application_leaves_optional_list() {
        assert!(required_documents(PurchaseType::Regular, true).contains(&CreditApplication));
        assert!(!required_documents(PurchaseType::Regular, false).contains(&CreditApplication));
        assert!(!optional_documents(PurchaseType::Regular, true).contains(&CreditApplication));
    }

    #[test]
    fn checklists_by_purchase_type() {
        assert_eq!(
            required_documents(PurchaseType::OnceOff, false),
            vec![CompanyRegistration, BankConfirmation]
        );
        assert!(!required_documents(PurchaseType::Regular, false).contains(&Nda));
        assert_eq!(required_documents(PurchaseType::SharedIp, false).len(), 16);
        assert_eq!(required_documents(PurchaseType::SharedIp, true).len(), 17);
    }

    #[test_case(&[Nda, BankConfirmation], PurchaseType::SharedIp)]
    #[test_case(&[BankConfirmation, CompanyRegistration], PurchaseType::OnceOff)]
    #[test_case(&[BankConfirmation, CompanyRegistration, TaxClearance], PurchaseType::Regular)]
    #[test_case(&[BankConfirmation], PurchaseType::Regular)]
    fn purchase_type_inference(uploaded: &[DocumentCategory], expected: PurchaseType) {
        assert_eq!(infer_purchase_type(&set(uploaded)), expected);
    }

    proptest! {
        #[test]
        fn resolver_is_deterministic(pt in purchase_type(), credit in any::<bool>()) {
            prop_assert_eq!(mandatory_documents(pt, credit), mandatory_documents(pt, credit));
        }

        #[test]
        fn once_off_needs_fewer_documents(credit in any::<bool>()) {
            prop_assert!(
                mandatory_documents(PurchaseType::OnceOff, credit).len()
                    < mandatory_documents(PurchaseType::Regular, credit).len()
            );
        }

        #[test]
        fn shared_ip_always_requires_nda(credit in any::<bool>()) {
            prop_assert!(mandatory_documents(PurchaseType::SharedIp, credit).contains(&Nda));
        }

        #[test]
        fn mandatory_documents_are_listed_on_the_form(pt in purchase_type(), credit in any::<bool>()) {
            let listed = required_documents(pt, credit);
            for doc in mandatory_documents(pt, credit) {
                prop_assert!(listed.contains(&doc));
            }
        }
    }
}
