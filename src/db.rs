use anyhow::Context;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::engine::History;
use crate::models::{
    Attendance, DailyRecord, MonthlyAggregate, MonthlyMetrics, MonthlySearch, Rating,
    RatingSource, YearMonth,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn fetch_daily_history(pool: &PgPool) -> anyhow::Result<Vec<DailyRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT employee_id, employee_name, department, record_date, attendance,
               late_early_minutes, overtime_hours, total_tasks, completed_tasks
        FROM performance_track.daily_performance
        ORDER BY record_date, employee_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let flag: String = row.try_get("attendance")?;
        let attendance: Attendance = flag
            .parse()
            .map_err(|reason: String| anyhow::anyhow!("stored attendance flag is invalid: {reason}"))?;
        records.push(DailyRecord::new(
            row.try_get::<String, _>("employee_id")?,
            row.try_get::<String, _>("employee_name")?,
            row.try_get::<String, _>("department")?,
            row.try_get("record_date")?,
            attendance,
            Some(i64::from(row.try_get::<i32, _>("late_early_minutes")?)),
            Some(row.try_get("overtime_hours")?),
            Some(i64::from(row.try_get::<i32, _>("total_tasks")?)),
            Some(i64::from(row.try_get::<i32, _>("completed_tasks")?)),
        ));
    }

    Ok(records)
}

fn monthly_from_row(row: &PgRow) -> anyhow::Result<MonthlyAggregate> {
    let record_month: NaiveDate = row.try_get("record_month")?;
    let rating = row
        .try_get::<Option<i16>, _>("performance_rating")?
        .map(|value| {
            u8::try_from(value)
                .map_err(|_| format!("rating {value} out of range"))
                .and_then(Rating::try_from)
                .map_err(|reason| anyhow::anyhow!(reason))
        })
        .transpose()?;
    let rating_source = row
        .try_get::<Option<String>, _>("rating_source")?
        .as_deref()
        .and_then(RatingSource::from_db_value);

    Ok(MonthlyAggregate {
        employee_id: row.try_get("employee_id")?,
        employee_name: row.try_get("employee_name")?,
        department: row.try_get("department")?,
        year_month: YearMonth::from_date(record_month),
        metrics: MonthlyMetrics {
            attendance_rate: row.try_get("attendance_rate")?,
            kpi_completion: row.try_get("kpi_completion")?,
            overtime_hours: row.try_get("overtime_hours")?,
        },
        performance_rating: rating,
        rating_source,
    })
}

const MONTHLY_COLUMNS: &str = "employee_id, employee_name, department, record_month, \
    attendance_rate, kpi_completion, overtime_hours, performance_rating, rating_source";

pub async fn fetch_monthly_history(pool: &PgPool) -> anyhow::Result<Vec<MonthlyAggregate>> {
    let query = format!(
        "SELECT {MONTHLY_COLUMNS} FROM performance_track.employee_performance \
         ORDER BY record_month, employee_id"
    );
    let rows = sqlx::query(&query).fetch_all(pool).await?;
    rows.iter().map(monthly_from_row).collect()
}

pub async fn fetch_month(pool: &PgPool, month: YearMonth) -> anyhow::Result<Vec<MonthlyAggregate>> {
    let query = format!(
        "SELECT {MONTHLY_COLUMNS} FROM performance_track.employee_performance \
         WHERE record_month = $1 ORDER BY employee_id"
    );
    let rows = sqlx::query(&query)
        .bind(month.first_day())
        .fetch_all(pool)
        .await?;
    rows.iter().map(monthly_from_row).collect()
}

pub async fn search_monthly(
    pool: &PgPool,
    search: &MonthlySearch,
) -> anyhow::Result<Vec<MonthlyAggregate>> {
    let query = format!(
        "SELECT {MONTHLY_COLUMNS} FROM performance_track.employee_performance \
         WHERE ($1::text IS NULL OR employee_id = $1) \
           AND ($2::text IS NULL OR employee_name ILIKE $2) \
           AND ($3::date IS NULL OR record_month = $3) \
         ORDER BY record_month DESC, employee_id"
    );
    let rows = sqlx::query(&query)
        .bind(search.employee_id())
        .bind(search.name_pattern())
        .bind(search.month.map(|m| m.first_day()))
        .fetch_all(pool)
        .await?;
    rows.iter().map(monthly_from_row).collect()
}

fn month_from_row(row: &PgRow) -> anyhow::Result<YearMonth> {
    let month: NaiveDate = row.try_get("record_month")?;
    Ok(YearMonth::from_date(month))
}

/// Every month with stored ratings, newest first.
pub async fn list_months(pool: &PgPool) -> anyhow::Result<Vec<YearMonth>> {
    let rows = sqlx::query(
        r#"
        SELECT DISTINCT record_month
        FROM performance_track.employee_performance
        ORDER BY record_month DESC
        "#,
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(month_from_row).collect()
}

pub async fn load_history(pool: &PgPool) -> anyhow::Result<History> {
    Ok(History {
        daily: fetch_daily_history(pool)
            .await
            .context("failed to load daily history")?,
        monthly: fetch_monthly_history(pool)
            .await
            .context("failed to load monthly history")?,
    })
}

/// Months among `months` that already have stored monthly records.
pub async fn months_with_data(pool: &PgPool, months: &[YearMonth]) -> anyhow::Result<Vec<YearMonth>> {
    let firsts: Vec<NaiveDate> = months.iter().map(|m| m.first_day()).collect();
    let rows = sqlx::query(
        r#"
        SELECT DISTINCT record_month
        FROM performance_track.employee_performance
        WHERE record_month = ANY($1)
        ORDER BY record_month
        "#,
    )
    .bind(firsts)
    .fetch_all(pool)
    .await?;

    rows.iter().map(month_from_row).collect()
}

/// Stores a rated batch and its daily records in one transaction.
pub async fn save_import(
    pool: &PgPool,
    daily: &[DailyRecord],
    monthly: &[MonthlyAggregate],
) -> anyhow::Result<(usize, usize)> {
    let mut tx = pool.begin().await?;
    let mut daily_inserted = 0usize;
    let mut monthly_inserted = 0usize;

    for record in daily {
        let result = sqlx::query(
            r#"
            INSERT INTO performance_track.daily_performance
            (id, employee_id, employee_name, department, record_date, attendance,
             late_early_minutes, overtime_hours, total_tasks, completed_tasks)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (employee_id, record_date) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&record.employee_id)
        .bind(&record.employee_name)
        .bind(&record.department)
        .bind(record.date)
        .bind(record.attendance.as_flag())
        .bind(i32::try_from(record.late_early_minutes).unwrap_or(i32::MAX))
        .bind(record.overtime_hours)
        .bind(i32::try_from(record.total_tasks).unwrap_or(i32::MAX))
        .bind(i32::try_from(record.completed_tasks).unwrap_or(i32::MAX))
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() > 0 {
            daily_inserted += 1;
        }
    }

    for record in monthly {
        let result = sqlx::query(
            r#"
            INSERT INTO performance_track.employee_performance
            (id, employee_id, employee_name, department, record_month, attendance_rate,
             kpi_completion, overtime_hours, performance_rating, rating_source)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (employee_id, record_month) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&record.employee_id)
        .bind(&record.employee_name)
        .bind(&record.department)
        .bind(record.year_month.first_day())
        .bind(record.metrics.attendance_rate)
        .bind(record.metrics.kpi_completion)
        .bind(record.metrics.overtime_hours)
        .bind(record.performance_rating.map(|r| i16::from(r.value())))
        .bind(record.rating_source.map(|s| s.db_value()))
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() > 0 {
            monthly_inserted += 1;
        }
    }

    tx.commit().await?;
    Ok((daily_inserted, monthly_inserted))
}
