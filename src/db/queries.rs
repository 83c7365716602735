//! SQL query constants and builders
//!
//! Contains all SQL used by the PostgreSQL store. Table names interpolated by
//! the builders always come from [`Entity::table`], never from user input.

use crate::backup::Entity;

/// Schema, in foreign-key order. Every statement is idempotent.
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS currencies (
        id SERIAL PRIMARY KEY,
        code VARCHAR(10) UNIQUE NOT NULL,
        name VARCHAR(100) NOT NULL,
        symbol VARCHAR(10),
        is_default BOOLEAN NOT NULL DEFAULT false,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS settings (
        id SERIAL PRIMARY KEY,
        site_title VARCHAR(255),
        site_description TEXT,
        logo_url TEXT,
        favicon_url TEXT,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS audit_logs (
        id SERIAL PRIMARY KEY,
        action VARCHAR(50) NOT NULL,
        entity_type VARCHAR(50) NOT NULL,
        entity_id INTEGER,
        details TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS exchange_rates (
        id SERIAL PRIMARY KEY,
        currency_id INTEGER NOT NULL REFERENCES currencies(id),
        rate NUMERIC(18, 6) NOT NULL,
        rate_date DATE NOT NULL DEFAULT CURRENT_DATE,
        source VARCHAR(50),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS caries (
        id SERIAL PRIMARY KEY,
        title VARCHAR(255) NOT NULL,
        type VARCHAR(20) NOT NULL DEFAULT 'CUSTOMER',
        phone VARCHAR(50),
        email VARCHAR(255),
        address TEXT,
        city VARCHAR(100),
        district VARCHAR(100),
        tax_number VARCHAR(50),
        tax_office VARCHAR(100),
        notes TEXT,
        default_currency_id INTEGER REFERENCES currencies(id),
        opening_balance NUMERIC(18, 2) NOT NULL DEFAULT 0,
        balance NUMERIC(18, 2) NOT NULL DEFAULT 0,
        salary NUMERIC(18, 2),
        is_active BOOLEAN NOT NULL DEFAULT true,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS proposals (
        id SERIAL PRIMARY KEY,
        proposal_number VARCHAR(50) UNIQUE NOT NULL,
        customer_id INTEGER NOT NULL REFERENCES caries(id),
        currency_id INTEGER NOT NULL REFERENCES currencies(id),
        proposal_date DATE NOT NULL,
        valid_until DATE,
        exchange_rate NUMERIC(18, 6) NOT NULL DEFAULT 1,
        total_amount NUMERIC(18, 2) NOT NULL DEFAULT 0,
        discount_rate NUMERIC(5, 2) NOT NULL DEFAULT 0,
        delivery_time VARCHAR(255),
        payment_terms VARCHAR(255),
        notes TEXT,
        status VARCHAR(20) NOT NULL DEFAULT 'DRAFT'
            CHECK (status IN ('DRAFT', 'SENT', 'APPROVED', 'REJECTED')),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS invoices (
        id SERIAL PRIMARY KEY,
        invoice_number VARCHAR(50) UNIQUE NOT NULL,
        invoice_type VARCHAR(20) NOT NULL DEFAULT 'SALES',
        cari_id INTEGER NOT NULL REFERENCES caries(id),
        currency_id INTEGER NOT NULL REFERENCES currencies(id),
        invoice_date DATE NOT NULL DEFAULT CURRENT_DATE,
        due_date DATE,
        exchange_rate NUMERIC(18, 6) NOT NULL DEFAULT 1,
        subtotal NUMERIC(18, 2) NOT NULL DEFAULT 0,
        vat_total NUMERIC(18, 2) NOT NULL DEFAULT 0,
        total_amount NUMERIC(18, 2) NOT NULL DEFAULT 0,
        status VARCHAR(20) NOT NULL DEFAULT 'OPEN',
        notes TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS sales_slips (
        id SERIAL PRIMARY KEY,
        slip_number VARCHAR(50) UNIQUE NOT NULL,
        cari_id INTEGER REFERENCES caries(id),
        currency_id INTEGER NOT NULL REFERENCES currencies(id),
        slip_date DATE NOT NULL DEFAULT CURRENT_DATE,
        total_amount NUMERIC(18, 2) NOT NULL DEFAULT 0,
        notes TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS payments (
        id SERIAL PRIMARY KEY,
        cari_id INTEGER NOT NULL REFERENCES caries(id),
        currency_id INTEGER NOT NULL REFERENCES currencies(id),
        invoice_id INTEGER REFERENCES invoices(id),
        payment_type VARCHAR(20) NOT NULL,
        amount NUMERIC(18, 2) NOT NULL,
        exchange_rate NUMERIC(18, 6) NOT NULL DEFAULT 1,
        payment_date DATE NOT NULL DEFAULT CURRENT_DATE,
        method VARCHAR(30),
        description TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS cash_transactions (
        id SERIAL PRIMARY KEY,
        cari_id INTEGER REFERENCES caries(id),
        currency_id INTEGER NOT NULL REFERENCES currencies(id),
        transaction_type VARCHAR(10) NOT NULL,
        amount NUMERIC(18, 2) NOT NULL,
        transaction_date DATE NOT NULL DEFAULT CURRENT_DATE,
        description TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS proposal_items (
        id SERIAL PRIMARY KEY,
        proposal_id INTEGER NOT NULL REFERENCES proposals(id) ON DELETE CASCADE,
        stock_code VARCHAR(100),
        product_name VARCHAR(255) NOT NULL,
        brand VARCHAR(100),
        quantity NUMERIC(18, 3) NOT NULL,
        unit VARCHAR(20) NOT NULL DEFAULT 'Adet',
        unit_price NUMERIC(18, 4) NOT NULL,
        vat_rate INTEGER NOT NULL DEFAULT 20,
        line_total NUMERIC(18, 2) NOT NULL,
        description TEXT
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS invoice_items (
        id SERIAL PRIMARY KEY,
        invoice_id INTEGER NOT NULL REFERENCES invoices(id) ON DELETE CASCADE,
        stock_code VARCHAR(100),
        product_name VARCHAR(255) NOT NULL,
        quantity NUMERIC(18, 3) NOT NULL,
        unit VARCHAR(20) NOT NULL DEFAULT 'Adet',
        unit_price NUMERIC(18, 4) NOT NULL,
        vat_rate INTEGER NOT NULL DEFAULT 20,
        line_total NUMERIC(18, 2) NOT NULL,
        description TEXT
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS sales_items (
        id SERIAL PRIMARY KEY,
        sales_slip_id INTEGER NOT NULL REFERENCES sales_slips(id) ON DELETE CASCADE,
        product_name VARCHAR(255) NOT NULL,
        quantity NUMERIC(18, 3) NOT NULL,
        unit VARCHAR(20) NOT NULL DEFAULT 'Adet',
        unit_price NUMERIC(18, 4) NOT NULL,
        vat_rate INTEGER NOT NULL DEFAULT 20,
        line_total NUMERIC(18, 2) NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_proposals_customer_id ON proposals(customer_id)",
    "CREATE INDEX IF NOT EXISTS idx_proposal_items_proposal_id ON proposal_items(proposal_id)",
    "CREATE INDEX IF NOT EXISTS idx_invoice_items_invoice_id ON invoice_items(invoice_id)",
    "CREATE INDEX IF NOT EXISTS idx_sales_items_sales_slip_id ON sales_items(sales_slip_id)",
];

/// Currencies offered by the proposal form out of the box
pub const SEED_CURRENCIES: &str = r#"
    INSERT INTO currencies (code, name, symbol, is_default) VALUES
        ('TL', 'Türk Lirası', '₺', true),
        ('USD', 'Amerikan Doları', '$', false),
        ('EUR', 'Euro', '€', false)
    ON CONFLICT (code) DO NOTHING
"#;

/// Proposals joined with their customer and currency; filters go after it
/// against the `p` alias
pub const PROPOSAL_SELECT: &str = r#"
    SELECT p.id, p.proposal_number, p.customer_id, p.currency_id, p.proposal_date, p.valid_until,
        p.exchange_rate, p.total_amount, p.discount_rate, p.delivery_time, p.payment_terms, p.notes,
        p.status, p.created_at, p.updated_at,
        c.title AS customer_title, c.email AS customer_email, c.phone AS customer_phone,
        c.address AS customer_address, c.tax_number AS customer_tax_number,
        c.tax_office AS customer_tax_office,
        cur.code AS currency_code, cur.name AS currency_name, cur.symbol AS currency_symbol,
        cur.is_default AS currency_is_default
    FROM proposals p
    LEFT JOIN caries c ON c.id = p.customer_id
    LEFT JOIN currencies cur ON cur.id = p.currency_id
"#;

pub const PROPOSAL_ITEM_COLUMNS: &str = "id, proposal_id, stock_code, product_name, brand, quantity, \
     unit, unit_price, vat_rate, line_total, description";

pub const PROPOSAL_NUMBERS_WITH_PREFIX: &str =
    "SELECT proposal_number FROM proposals WHERE starts_with(proposal_number, $1)";

pub const INSERT_PROPOSAL: &str = r#"
    INSERT INTO proposals (
        proposal_number, customer_id, currency_id, proposal_date, valid_until, exchange_rate,
        total_amount, discount_rate, delivery_time, payment_terms, notes, status
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
    RETURNING id
"#;

pub const INSERT_PROPOSAL_ITEM: &str = r#"
    INSERT INTO proposal_items (
        proposal_id, stock_code, product_name, brand, quantity, unit, unit_price, vat_rate,
        line_total, description
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
"#;

/// `$12` NULL keeps the stored status
pub const UPDATE_PROPOSAL: &str = r#"
    UPDATE proposals SET
        customer_id = $2,
        currency_id = $3,
        proposal_date = $4,
        valid_until = $5,
        exchange_rate = $6,
        total_amount = $7,
        discount_rate = $8,
        delivery_time = $9,
        payment_terms = $10,
        notes = $11,
        status = COALESCE($12, status),
        updated_at = now()
    WHERE id = $1
"#;

pub const DELETE_PROPOSAL_ITEMS: &str = "DELETE FROM proposal_items WHERE proposal_id = $1";

pub const DELETE_PROPOSAL: &str = "DELETE FROM proposals WHERE id = $1";

pub const LIST_CURRENCIES: &str =
    "SELECT id, code, name, symbol, is_default FROM currencies ORDER BY id";

pub fn select_proposal_by_id() -> String {
    format!("{} WHERE p.id = $1", PROPOSAL_SELECT)
}

/// Items of several proposals at once; `$1` is an `INT4[]`
pub fn select_items_for_proposals() -> String {
    format!(
        "SELECT {} FROM proposal_items WHERE proposal_id = ANY($1) ORDER BY proposal_id, id",
        PROPOSAL_ITEM_COLUMNS
    )
}

/// Whole table as one JSON array, ordered by id
pub fn export_table(entity: Entity) -> String {
    format!(
        "SELECT COALESCE(json_agg(t ORDER BY t.id), '[]'::json) FROM {} t",
        entity.table()
    )
}

pub fn delete_all(entity: Entity) -> String {
    format!("DELETE FROM {}", entity.table())
}

/// Column names of one table (`$1`), in definition order
pub const TABLE_COLUMNS: &str = r#"
    SELECT column_name::text FROM information_schema.columns
    WHERE table_schema = current_schema() AND table_name = $1
    ORDER BY ordinal_position
"#;

/// Bulk insert from a JSON array of row objects (`$1`).
///
/// Only `columns` are written, so the others take their column default.
pub fn insert_rows(entity: Entity, columns: &[&str]) -> String {
    let columns = columns
        .iter()
        .map(|c| format!("\"{}\"", c.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {table} ({columns}) SELECT {columns} FROM jsonb_populate_recordset(NULL::{table}, $1::jsonb)",
        table = entity.table(),
        columns = columns
    )
}

/// Point the id sequence past the highest restored id
pub fn reset_sequence(entity: Entity) -> String {
    format!(
        "SELECT setval(pg_get_serial_sequence('{table}', 'id'), COALESCE(MAX(id), 1), MAX(id) IS NOT NULL) FROM {table}",
        table = entity.table()
    )
}
