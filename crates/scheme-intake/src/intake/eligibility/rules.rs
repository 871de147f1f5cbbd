use super::super::domain::{
    EligibilityFacts, Scheme, ALL_DISTRICTS, ANY_GENDER, GENERAL_COMMUNITY,
};
use super::{CheckOutcome, Criterion, CriterionCheck};

pub(crate) fn check_all(facts: &EligibilityFacts, scheme: &Scheme) -> Vec<CriterionCheck> {
    vec![
        check_age(facts, scheme),
        check_gender(facts, scheme),
        check_income(facts, scheme),
        check_district(facts, scheme),
        check_community(facts, scheme),
    ]
}

fn skipped(criterion: Criterion) -> CriterionCheck {
    CriterionCheck {
        criterion,
        outcome: CheckOutcome::Skipped,
        notes: "not present in profile".to_string(),
    }
}

fn verdict(criterion: Criterion, passed: bool, notes: String) -> CriterionCheck {
    CriterionCheck {
        criterion,
        outcome: if passed {
            CheckOutcome::Passed
        } else {
            CheckOutcome::Failed
        },
        notes,
    }
}

fn check_age(facts: &EligibilityFacts, scheme: &Scheme) -> CriterionCheck {
    let Some(age) = facts.age else {
        return skipped(Criterion::Age);
    };
    let criteria = &scheme.criteria;
    let within = criteria.min_age <= age && age <= criteria.max_age;
    verdict(
        Criterion::Age,
        within,
        format!(
            "age {age} against range {}-{}",
            criteria.min_age, criteria.max_age
        ),
    )
}

fn check_gender(facts: &EligibilityFacts, scheme: &Scheme) -> CriterionCheck {
    let Some(gender) = facts.gender.as_deref() else {
        return skipped(Criterion::Gender);
    };
    let required = scheme.criteria.gender_eligibility.as_str();
    verdict(
        Criterion::Gender,
        required == ANY_GENDER || required == gender,
        format!("gender {gender} against {required}"),
    )
}

fn check_income(facts: &EligibilityFacts, scheme: &Scheme) -> CriterionCheck {
    let Some(income) = facts.annual_income else {
        return skipped(Criterion::AnnualIncome);
    };
    let ceiling = scheme.criteria.max_annual_income;
    verdict(
        Criterion::AnnualIncome,
        income <= ceiling,
        format!("annual income {income} against ceiling {ceiling}"),
    )
}

fn check_district(facts: &EligibilityFacts, scheme: &Scheme) -> CriterionCheck {
    let Some(district) = facts.district.as_deref() else {
        return skipped(Criterion::District);
    };
    let districts = &scheme.criteria.districts;
    if districts.is_empty() {
        return verdict(
            Criterion::District,
            true,
            format!("district {district}; scheme has no geography restriction"),
        );
    }
    let covered = districts
        .iter()
        .any(|candidate| candidate == ALL_DISTRICTS || candidate == district);
    verdict(
        Criterion::District,
        covered,
        format!("district {district} against [{}]", districts.join(", ")),
    )
}

fn check_community(facts: &EligibilityFacts, scheme: &Scheme) -> CriterionCheck {
    let Some(community) = facts.community.as_deref() else {
        return skipped(Criterion::Community);
    };
    let eligible = &scheme.criteria.community_eligibility;
    let covered = eligible
        .iter()
        .any(|candidate| candidate == GENERAL_COMMUNITY || candidate == community);
    verdict(
        Criterion::Community,
        covered,
        format!("community {community} against [{}]", eligible.join(", ")),
    )
}
