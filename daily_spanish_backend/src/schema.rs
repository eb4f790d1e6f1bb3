table! {
    learners (id) {
        id -> Int8,
        display_name -> Varchar,
        level -> Varchar,
        exercise_count -> Int4,
        referral_count -> Int4,
        challenge_score -> Int4,
        streak_days -> Int4,
        last_practice -> Nullable<Date>,
        joined -> Timestamptz,
    }
}

table! {
    completed_exercises (user_id, exercise_id) {
        user_id -> Int8,
        exercise_id -> Varchar,
    }
}

table! {
    achievement_grants (user_id, achievement) {
        user_id -> Int8,
        achievement -> Varchar,
        earned_at -> Timestamptz,
    }
}

table! {
    blocked_users (user_id) {
        user_id -> Int8,
        blocked_at -> Timestamptz,
    }
}

table! {
    feedback (id) {
        id -> Int4,
        user_id -> Int8,
        message -> Text,
        created -> Timestamptz,
    }
}

joinable!(completed_exercises -> learners (user_id));
joinable!(achievement_grants -> learners (user_id));

allow_tables_to_appear_in_same_query!(
    learners,
    completed_exercises,
    achievement_grants,
    blocked_users,
    feedback,
);
