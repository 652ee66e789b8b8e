// Diesel table definitions; kept in sync with `diesel_runtime::ensure_tables`.

diesel::table! {
    videos (id) {
        id -> Text,
        creator_id -> Text,
        video_created_at -> Timestamp,
        views_count -> Int8,
        likes_count -> Int8,
        comments_count -> Int8,
        reports_count -> Int8,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    video_snapshots (id) {
        id -> Text,
        video_id -> Text,
        views_count -> Int8,
        likes_count -> Int8,
        comments_count -> Int8,
        reports_count -> Int8,
        delta_views_count -> Int8,
        delta_likes_count -> Int8,
        delta_comments_count -> Int8,
        delta_reports_count -> Int8,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    ingestion_state (source) {
        source -> Text,
        videos_committed -> Int8,
        completed -> Bool,
        updated_at -> Timestamp,
    }
}

diesel::joinable!(video_snapshots -> videos (video_id));

diesel::allow_tables_to_appear_in_same_query!(videos, video_snapshots, ingestion_state,);
