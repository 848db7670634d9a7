//! Shared fixtures for the integration suite: a minimal valid Scholar
//! profile-page HTML body and the raw-SQL inserts needed to seed a user and
//! a scholar profile (no repository `create` helper exists for either).

use chrono::Utc;
use scholarr_ingestion::db::Db;
use sqlx::SqlitePool;

/// One-row profile page: a single publication with a cluster id, citation
/// count, and year, and no show-more button so pagination stops after page 1.
pub fn single_publication_profile_html(scholar_id: &str, cluster_id: &str, title: &str) -> String {
    format!(
        r#"<html>
          <div id="gsc_prf_in">Jane Researcher</div>
          <img id="gsc_prf_pup-img" src="https://scholar.google.com/avatar.jpg" />
          <span id="gsc_a_nn">Articles 1-1</span>
          <table><tbody id="gsc_a_b">
            <tr class="gsc_a_tr">
              <td class="gsc_a_t">
                <a class="gsc_a_at" href="/citations?view_op=view_citation&amp;citation_for_view={scholar_id}:{cluster_id}">{title}</a>
                <div class="gs_gray">J Researcher, A Coauthor</div>
                <div class="gs_gray">Journal of Examples, 2023</div>
              </td>
              <td class="gsc_a_c"><a class="gsc_a_ac">Cited by 5</a></td>
              <td class="gsc_a_y"><span class="gsc_a_h">2023</span></td>
            </tr>
          </tbody></table>
        </html>"#
    )
}

/// Page with no publication rows and a "didn't match" banner.
pub fn no_results_profile_html() -> String {
    r#"<html><body>Your search didn't match any articles.</body></html>"#.to_string()
}

/// Two-page fixture: page 1 has one publication and a live show-more button
/// (forcing a continuation), page 2 has a second publication and no
/// show-more button (forcing pagination to stop there).
pub fn two_page_profile_html(scholar_id: &str) -> (String, String) {
    let page_one = format!(
        r#"<html>
          <div id="gsc_prf_in">Jane Researcher</div>
          <span id="gsc_a_nn">Articles 1-1</span>
          <table><tbody id="gsc_a_b">
            <tr class="gsc_a_tr">
              <td class="gsc_a_t">
                <a class="gsc_a_at" href="/citations?view_op=view_citation&amp;citation_for_view={scholar_id}:pageOneAAA">Page One Paper</a>
                <div class="gs_gray">J Researcher</div>
                <div class="gs_gray">Journal of Examples, 2022</div>
              </td>
              <td class="gsc_a_c"><a class="gsc_a_ac">Cited by 1</a></td>
              <td class="gsc_a_y"><span class="gsc_a_h">2022</span></td>
            </tr>
          </tbody></table>
          <button id="gsc_bpf_more">Show more</button>
        </html>"#
    );
    let page_two = format!(
        r#"<html>
          <div id="gsc_prf_in">Jane Researcher</div>
          <span id="gsc_a_nn">Articles 2-2</span>
          <table><tbody id="gsc_a_b">
            <tr class="gsc_a_tr">
              <td class="gsc_a_t">
                <a class="gsc_a_at" href="/citations?view_op=view_citation&amp;citation_for_view={scholar_id}:pageTwoBBB">Page Two Paper</a>
                <div class="gs_gray">J Researcher</div>
                <div class="gs_gray">Journal of Examples, 2023</div>
              </td>
              <td class="gsc_a_c"><a class="gsc_a_ac">Cited by 2</a></td>
              <td class="gsc_a_y"><span class="gsc_a_h">2023</span></td>
            </tr>
          </tbody></table>
          <button id="gsc_bpf_more" disabled>Show more</button>
        </html>"#
    );
    (page_one, page_two)
}

pub async fn seed_user(pool: &SqlitePool, email: &str) -> i64 {
    let result = sqlx::query("INSERT INTO users (email, password_hash) VALUES (?, 'x')")
        .bind(email)
        .execute(pool)
        .await
        .expect("insert user");
    result.last_insert_rowid()
}

pub async fn seed_scholar(pool: &SqlitePool, user_id: i64, scholar_id: &str) -> i64 {
    let result = sqlx::query("INSERT INTO scholar_profiles (user_id, scholar_id) VALUES (?, ?)")
        .bind(user_id)
        .bind(scholar_id)
        .execute(pool)
        .await
        .expect("insert scholar profile");
    result.last_insert_rowid()
}

pub async fn enable_auto_run(pool: &SqlitePool, user_id: i64) {
    sqlx::query("INSERT OR IGNORE INTO user_settings (user_id) VALUES (?)")
        .bind(user_id)
        .execute(pool)
        .await
        .expect("insert settings if missing");
    sqlx::query(
        "UPDATE user_settings SET auto_run_enabled = 1, run_interval_minutes = 15 WHERE user_id = ?",
    )
    .bind(user_id)
    .execute(pool)
    .await
    .expect("enable auto run");
}

pub async fn open_memory_db() -> Db {
    Db::open("sqlite::memory:").await.expect("open in-memory db")
}

pub fn now() -> chrono::DateTime<Utc> {
    Utc::now()
}
