//! # Fee normalizer
//!
//! Maps the free-text fee vocabulary of every feed onto a [`FeeCategory`].
//!
//! Classification is an ordered rule table evaluated top to bottom; the first rule that fires wins and text no rule
//! recognises is [`FeeCategory::Other`]. Many categories share substrings, so the order of [`RULES`] is significant:
//! long-term storage must be tested before storage, multi-channel fulfillment before fulfillment, refund commission
//! before commission, and so on.
//!
//! Rules match against a "squashed" form of the text (ASCII alphanumerics only, lower case), so
//! `FBAPerUnitFulfillmentFee`, `FBA per unit fulfillment fee` and `fba_per_unit_fulfillment_fee` classify the same.
//! Short acronyms are matched as whole words against a spaced form of the text instead, since they would otherwise
//! fire inside unrelated words.
use once_cell::sync::Lazy;
use regex::Regex;

use crate::db_types::FeeCategory;

/// Bumped whenever a rule is added, removed, reordered or changes meaning.
pub const RULE_TABLE_VERSION: u32 = 4;

/// The name reported by [`explain`] when no rule fires.
pub const FALLBACK_RULE: &str = "unclassified";

/// The text being classified, plus the transaction context it appeared in.
#[derive(Debug, Clone)]
pub struct FeeDescriptor {
    squashed: String,
    spaced: String,
    refund_context: bool,
}

impl FeeDescriptor {
    pub fn new(text: &str) -> Self {
        Self { squashed: squash(text), spaced: spaced_words(text), refund_context: false }
    }

    /// A descriptor for fee text seen inside a transaction of the given type. Refund, chargeback and guarantee claim
    /// transactions give a plain commission the meaning of a refunded referral fee.
    pub fn in_transaction(transaction_type: &str, text: &str) -> Self {
        let tx = squash(transaction_type);
        let refund_context = tx.contains("refund") || tx.contains("chargeback") || tx.contains("guaranteeclaim");
        Self { refund_context, ..Self::new(text) }
    }

    fn has(&self, needle: &str) -> bool {
        self.squashed.contains(needle)
    }

    fn has_any(&self, needles: &[&str]) -> bool {
        needles.iter().any(|n| self.squashed.contains(n))
    }

    fn has_word(&self, word: &Lazy<Option<Regex>>) -> bool {
        let word: &Option<Regex> = word;
        word.as_ref().map(|re| re.is_match(&self.spaced)).unwrap_or(false)
    }
}

pub struct FeeRule {
    pub name: &'static str,
    pub category: FeeCategory,
    matches: fn(&FeeDescriptor) -> bool,
}

static LOST_WORD: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\blost\b").ok());
static LTSF_WORD: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\bltsf\b").ok());
static MCF_WORD: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\bmcf\b").ok());
static DST_WORD: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\bdst\b").ok());

pub static RULES: &[FeeRule] = &[
    FeeRule {
        name: "reimbursement-reversal",
        category: FeeCategory::ReimbursementReversal,
        matches: |d| d.has("reversalreimbursement") || (d.has("reimburs") && d.has_any(&["reversal", "clawback"])),
    },
    FeeRule {
        name: "reimbursement-lost",
        category: FeeCategory::ReimbursementLost,
        matches: |d| d.has_word(&LOST_WORD) || d.has("missingfrominbound"),
    },
    FeeRule {
        name: "reimbursement-damaged",
        category: FeeCategory::ReimbursementDamaged,
        matches: |d| d.has("damage"),
    },
    FeeRule { name: "refund-commission", category: FeeCategory::RefundCommission, matches: |d| d.has("refundcommission") },
    FeeRule {
        name: "refunded-referral",
        category: FeeCategory::RefundedReferral,
        matches: |d| d.has("refundedreferral") || (d.refund_context && d.has_any(&["commission", "referral"])),
    },
    FeeRule {
        name: "long-term-storage",
        category: FeeCategory::LongTermStorage,
        matches: |d| d.has("longterm") || d.has_word(&LTSF_WORD),
    },
    FeeRule { name: "storage", category: FeeCategory::Storage, matches: |d| d.has("storage") },
    FeeRule {
        name: "multi-channel",
        category: FeeCategory::Mcf,
        matches: |d| d.has("multichannel") || d.has_word(&MCF_WORD),
    },
    FeeRule { name: "removal", category: FeeCategory::Removal, matches: |d| d.has("removal") },
    FeeRule { name: "disposal", category: FeeCategory::Disposal, matches: |d| d.has("disposal") },
    FeeRule {
        name: "inbound",
        category: FeeCategory::Inbound,
        matches: |d| d.has_any(&["inbound", "placementservice", "transportation", "partneredcarrier"]),
    },
    FeeRule {
        name: "digital-services",
        category: FeeCategory::DigitalServices,
        matches: |d| d.has("digitalservice") || d.has_word(&DST_WORD),
    },
    FeeRule {
        name: "fulfillment",
        category: FeeCategory::FbaFulfillment,
        matches: |d| d.has_any(&["fulfillment", "fulfilment", "fbaperunit", "weightbased", "pickpack", "fbafee"]),
    },
    FeeRule {
        name: "referral",
        category: FeeCategory::Referral,
        matches: |d| d.has_any(&["commission", "referral", "variableclosing", "fixedclosing"]),
    },
    FeeRule {
        name: "promotion",
        category: FeeCategory::Promotion,
        matches: |d| d.has_any(&["promotion", "promo", "coupon", "lightningdeal", "dealfee"]),
    },
    FeeRule { name: "subscription", category: FeeCategory::Other, matches: |d| d.has("subscription") },
];

/// Lower-cased ASCII alphanumerics of `text`, everything else dropped.
pub fn squash(text: &str) -> String {
    text.chars().filter(char::is_ascii_alphanumeric).map(|c| c.to_ascii_lowercase()).collect()
}

/// Lower-cased words of `text`, splitting on non-alphanumerics and on lower→upper case changes.
fn spaced_words(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut prev_lower = false;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if prev_lower && c.is_ascii_uppercase() {
                out.push(' ');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        } else {
            out.push(' ');
            prev_lower = false;
        }
    }
    out
}

fn first_match(descriptor: &FeeDescriptor) -> Option<&'static FeeRule> {
    RULES.iter().find(|rule| (rule.matches)(descriptor))
}

/// Classifies fee text without any transaction context.
pub fn classify(text: &str) -> FeeCategory {
    classify_descriptor(&FeeDescriptor::new(text))
}

/// Classifies fee text using the type of the transaction it appeared in.
pub fn classify_in_transaction(transaction_type: &str, text: &str) -> FeeCategory {
    classify_descriptor(&FeeDescriptor::in_transaction(transaction_type, text))
}

pub fn classify_descriptor(descriptor: &FeeDescriptor) -> FeeCategory {
    first_match(descriptor).map(|r| r.category).unwrap_or(FeeCategory::Other)
}

/// The name of the rule that classifies `text`, or [`FALLBACK_RULE`].
pub fn explain(text: &str) -> &'static str {
    explain_descriptor(&FeeDescriptor::new(text))
}

pub fn explain_descriptor(descriptor: &FeeDescriptor) -> &'static str {
    first_match(descriptor).map(|r| r.name).unwrap_or(FALLBACK_RULE)
}

#[cfg(test)]
mod test {
    use super::*;

    fn assert_all(category: FeeCategory, texts: &[&str]) {
        for text in texts {
            assert_eq!(classify(text), category, "'{text}' was classified by rule {}", explain(text));
        }
    }

    #[test]
    fn fulfillment() {
        assert_all(FeeCategory::FbaFulfillment, &[
            "FBAPerUnitFulfillmentFee",
            "FBA per unit fulfillment fee",
            "fba_per_unit_fulfillment_fee",
            "FBAWeightBasedFee",
            "FBAPerOrderFulfillmentFee",
            "FBAFees",
            "FBA Pick & Pack Fee",
        ]);
    }

    #[test]
    fn referral() {
        assert_all(FeeCategory::Referral, &["Commission", "ReferralFee", "VariableClosingFee", "FixedClosingFee"]);
    }

    #[test]
    fn storage_and_long_term_storage() {
        assert_all(FeeCategory::Storage, &["Storage Fee", "FBAStorageFee", "StorageRenewalBilling"]);
        assert_all(FeeCategory::LongTermStorage, &[
            "FBALongTermStorageFee",
            "Long-Term Storage Fee",
            "LTSF",
            "ltsf charge",
        ]);
    }

    #[test]
    fn multi_channel_before_fulfillment() {
        assert_all(FeeCategory::Mcf, &["MCF fulfillment fee", "FBA Multi-Channel Fulfillment Fee", "MCF Fee"]);
    }

    #[test]
    fn inbound_removal_disposal() {
        assert_all(FeeCategory::Inbound, &[
            "FBAInboundTransportationFee",
            "FBA Inbound Placement Service Fee",
            "Inbound Transportation Charge",
            "PartneredCarrierFee",
        ]);
        assert_all(FeeCategory::Removal, &["RemovalComplete", "FBA Removal Order Fee", "Removal fee"]);
        assert_all(FeeCategory::Disposal, &["DisposalComplete", "FBA Disposal Fee", "Disposal fee"]);
    }

    #[test]
    fn digital_services() {
        assert_all(FeeCategory::DigitalServices, &["DigitalServicesFee", "Digital Services Fee FBA", "DST"]);
        // 'dst' inside another word is not the acronym
        assert_eq!(classify("Midstream"), FeeCategory::Other);
    }

    #[test]
    fn refunds() {
        assert_all(FeeCategory::RefundCommission, &["RefundCommission", "Refund Commission"]);
        assert_all(FeeCategory::RefundedReferral, &["RefundedReferralFee"]);
        assert_eq!(classify_in_transaction("Refund", "Commission"), FeeCategory::RefundedReferral);
        assert_eq!(classify_in_transaction("Chargeback", "ReferralFee"), FeeCategory::RefundedReferral);
        assert_eq!(classify_in_transaction("Refund", "RefundCommission"), FeeCategory::RefundCommission);
        assert_eq!(classify_in_transaction("Order", "Commission"), FeeCategory::Referral);
        assert_eq!(classify_in_transaction("Refund", "FBAPerUnitFulfillmentFee"), FeeCategory::FbaFulfillment);
    }

    #[test]
    fn reimbursements() {
        assert_all(FeeCategory::ReimbursementDamaged, &["WAREHOUSE_DAMAGE", "Damaged:Warehouse", "WarehouseDamage"]);
        assert_all(FeeCategory::ReimbursementLost, &[
            "WAREHOUSE_LOST",
            "Lost:Warehouse",
            "WarehouseLost",
            "MISSING_FROM_INBOUND",
        ]);
        assert_all(FeeCategory::ReimbursementReversal, &[
            "REVERSAL_REIMBURSEMENT",
            "Reimbursement Reversal",
            "ReimbursementClawback",
        ]);
    }

    #[test]
    fn lost_only_as_a_word() {
        // "solostorage" contains "lost" once squashed
        assert_eq!(classify("Solo Storage Fee"), FeeCategory::Storage);
        assert_eq!(explain("Ballost Subscription"), "subscription");
    }

    #[test]
    fn promotions() {
        assert_all(FeeCategory::Promotion, &["PromotionMetaDataDefinitionValue", "CouponRedemptionFee", "LightningDealFee"]);
    }

    #[test]
    fn other() {
        assert_all(FeeCategory::Other, &["Subscription", "ShippingChargeback", "", "some brand new fee"]);
        assert_eq!(explain("Subscription"), "subscription");
        assert_eq!(explain("totally unknown"), FALLBACK_RULE);
    }

    #[test]
    fn ordering_sensitive_texts() {
        // each of these contains a substring of a later rule
        assert_eq!(explain("FBALongTermStorageFee"), "long-term-storage");
        assert_eq!(explain("FBA Multi-Channel Fulfillment Fee"), "multi-channel");
        assert_eq!(explain("RefundCommission"), "refund-commission");
        assert_eq!(explain("Lost inbound shipment"), "reimbursement-lost");
    }

    #[test]
    fn classification_is_pure() {
        for text in ["FBAPerUnitFulfillmentFee", "Commission", "Subscription", "LTSF"] {
            let first = classify(text);
            for _ in 0..5 {
                assert_eq!(classify(text), first);
            }
        }
    }

    #[test]
    fn rule_names_are_unique() {
        let mut names = RULES.iter().map(|r| r.name).collect::<Vec<_>>();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), RULES.len());
        assert!(!names.contains(&FALLBACK_RULE));
    }
}
