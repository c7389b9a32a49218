pub mod badge_reevaluation;
