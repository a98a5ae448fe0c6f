// Diesel table definitions, kept in lockstep with migrations/.
//
// Decimals are stored as text to preserve full precision; timestamps are
// RFC3339 text. Statistics (strengths, spreads, confidences) are stored as
// doubles.

diesel::table! {
    events (id) {
        id -> Text,
        slug -> Text,
        title -> Text,
        active -> Bool,
        closed -> Bool,
        end_time -> Nullable<Text>,
        series_id -> Nullable<Text>,
        updated_at -> Text,
    }
}

diesel::table! {
    markets (id) {
        id -> Text,
        event_id -> Text,
        slug -> Text,
        question -> Text,
        condition_id -> Text,
        tick_size -> Text,
        active -> Bool,
        closed -> Bool,
        neg_risk -> Bool,
        updated_at -> Text,
    }
}

diesel::table! {
    tokens (id) {
        id -> Text,
        market_id -> Text,
        outcome -> Text,
    }
}

diesel::table! {
    tags (id) {
        id -> Text,
        label -> Text,
        slug -> Text,
    }
}

diesel::table! {
    event_tags (event_id, tag_id) {
        event_id -> Text,
        tag_id -> Text,
    }
}

diesel::table! {
    orderbook_latest (token_id) {
        token_id -> Text,
        snapshot_ts -> Text,
        best_bid -> Nullable<Text>,
        best_ask -> Nullable<Text>,
        mid -> Nullable<Text>,
        bids -> Text,
        asks -> Text,
    }
}

diesel::table! {
    market_data_health (token_id) {
        token_id -> Text,
        last_ws_ts -> Nullable<Text>,
        last_rest_ts -> Nullable<Text>,
        spread_bps -> Nullable<Double>,
        price_jump_bps -> Nullable<Double>,
        last_book_change_ts -> Nullable<Text>,
        stale -> Bool,
    }
}

diesel::table! {
    last_trade_prices (token_id) {
        token_id -> Text,
        price -> Text,
        trade_ts -> Text,
    }
}

diesel::table! {
    signals (id) {
        id -> Text,
        signal_type -> Text,
        source -> Text,
        event_id -> Nullable<Text>,
        market_id -> Nullable<Text>,
        token_id -> Nullable<Text>,
        strength -> Double,
        direction -> Text,
        payload -> Text,
        expires_at -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    signal_sources (name) {
        name -> Text,
        source_type -> Text,
        endpoint -> Text,
        poll_interval_secs -> BigInt,
        enabled -> Bool,
        health_status -> Text,
        last_poll_at -> Nullable<Text>,
        last_error -> Nullable<Text>,
    }
}

diesel::table! {
    market_labels (market_id, label) {
        market_id -> Text,
        label -> Text,
        sub_label -> Nullable<Text>,
        auto_labeled -> Bool,
        confidence -> Double,
    }
}

diesel::table! {
    strategies (name) {
        name -> Text,
        enabled -> Bool,
        priority -> Integer,
        params -> Text,
        required_signals -> Text,
        stats -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    opportunities (id) {
        id -> Text,
        strategy -> Text,
        status -> Text,
        event_id -> Nullable<Text>,
        primary_market_id -> Nullable<Text>,
        edge_pct -> Text,
        edge_usd -> Text,
        max_size -> Text,
        confidence -> Double,
        risk_score -> Double,
        expires_at -> Text,
        legs -> Text,
        signal_ids -> Text,
        reasoning -> Text,
        warnings -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    execution_plans (id) {
        id -> Text,
        opportunity_id -> Text,
        status -> Text,
        strategy -> Text,
        planned_size_usd -> Text,
        max_loss_usd -> Text,
        kelly_fraction -> Double,
        legs -> Text,
        params -> Text,
        preflight_result -> Nullable<Text>,
        created_at -> Text,
        executed_at -> Nullable<Text>,
    }
}

diesel::table! {
    orders (id) {
        id -> Text,
        plan_id -> Text,
        token_id -> Text,
        side -> Text,
        direction -> Text,
        price -> Text,
        size_usd -> Text,
        status -> Text,
        external_order_id -> Nullable<Text>,
        client_order_id -> Text,
        submitted_at -> Nullable<Text>,
        filled_usd -> Text,
        avg_price -> Nullable<Text>,
        fee -> Text,
        failure_reason -> Nullable<Text>,
    }
}

diesel::table! {
    fills (id) {
        id -> Nullable<Integer>,
        plan_id -> Text,
        token_id -> Text,
        direction -> Text,
        filled_size -> Text,
        avg_price -> Text,
        fee -> Text,
        slippage -> Nullable<Text>,
        filled_at -> Text,
    }
}

diesel::table! {
    positions (token_id) {
        token_id -> Text,
        market_id -> Text,
        direction -> Text,
        quantity -> Text,
        avg_entry_price -> Text,
        current_price -> Nullable<Text>,
        cost_basis -> Text,
        unrealized_pnl -> Text,
        realized_pnl -> Text,
        status -> Text,
        strategy -> Text,
        opened_at -> Text,
        closed_at -> Nullable<Text>,
    }
}

diesel::table! {
    portfolio_snapshots (snapshot_at) {
        snapshot_at -> Text,
        total_cost_basis -> Text,
        total_market_value -> Text,
        unrealized_pnl -> Text,
        realized_pnl -> Text,
        net_liquidation -> Text,
    }
}

diesel::table! {
    pnl_records (plan_id) {
        plan_id -> Text,
        strategy -> Text,
        expected_edge -> Text,
        realized_pnl -> Nullable<Text>,
        realized_roi -> Nullable<Double>,
        slippage_loss -> Nullable<Text>,
        outcome -> Text,
        failure_reason -> Nullable<Text>,
        settled_at -> Nullable<Text>,
    }
}

diesel::table! {
    market_settlements (market_id) {
        market_id -> Text,
        event_id -> Text,
        outcome -> Text,
        labels -> Text,
        initial_yes_price -> Nullable<Text>,
        final_yes_price -> Nullable<Text>,
        settled_at -> Text,
    }
}

diesel::table! {
    execution_rules (strategy) {
        strategy -> Text,
        auto_execute -> Bool,
        min_confidence -> Double,
        min_edge_pct -> Text,
        stop_loss_pct -> Nullable<Text>,
        take_profit_pct -> Nullable<Text>,
        max_hold_hours -> Nullable<Integer>,
        max_daily_trades -> Integer,
        max_per_trade_usd -> Text,
    }
}

diesel::table! {
    system_settings (key) {
        key -> Text,
        value -> Text,
        description -> Nullable<Text>,
        updated_at -> Text,
    }
}

diesel::table! {
    market_reviews (market_id) {
        market_id -> Text,
        our_action -> Text,
        hypothetical_pnl -> Nullable<Text>,
        actual_pnl -> Nullable<Text>,
        lesson_tags -> Text,
        notes -> Nullable<Text>,
    }
}

diesel::table! {
    sync_states (scope) {
        scope -> Text,
        cursor -> Nullable<Text>,
        watermark_ts -> Nullable<Text>,
        last_success_at -> Nullable<Text>,
        last_attempt_at -> Nullable<Text>,
        last_error -> Nullable<Text>,
        stats -> Text,
    }
}

diesel::table! {
    journal_entries (plan_id) {
        plan_id -> Text,
        strategy -> Text,
        signals -> Text,
        decision_state -> Text,
        entry_params -> Text,
        outcome_state -> Nullable<Text>,
        notes -> Nullable<Text>,
        tags -> Text,
        created_at -> Text,
        reviewed_at -> Nullable<Text>,
    }
}

diesel::table! {
    daily_stats (date) {
        date -> Text,
        opportunities_detected -> Integer,
        opportunities_executed -> Integer,
        opportunities_expired -> Integer,
        plans_created -> Integer,
        plans_executed -> Integer,
        realized_pnl -> Text,
        win_count -> Integer,
        loss_count -> Integer,
    }
}

diesel::table! {
    strategy_daily_stats (date, strategy) {
        date -> Text,
        strategy -> Text,
        opportunities_detected -> Integer,
        opportunities_executed -> Integer,
        plans_executed -> Integer,
        realized_pnl -> Text,
        win_count -> Integer,
        loss_count -> Integer,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    events,
    markets,
    tokens,
    tags,
    event_tags,
    orderbook_latest,
    market_data_health,
    last_trade_prices,
    signals,
    signal_sources,
    market_labels,
    strategies,
    opportunities,
    execution_plans,
    orders,
    fills,
    positions,
    portfolio_snapshots,
    pnl_records,
    market_settlements,
    execution_rules,
    system_settings,
    market_reviews,
    sync_states,
    journal_entries,
    daily_stats,
    strategy_daily_stats,
);
