use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use sqlx::{QueryBuilder, Row, Sqlite};

use api::dir::MediaDirOut;
use api::media::{Group, MediaItemOut, MediaKind};
use api::query::{
    AuthorEntry, AuthorsFilter, AuthorsResp, Pagination, ResourceFilter, ResourcesResp, SortMode,
    TagEntry, TagsFilter, TagsResp,
};

use common::group::group_id;
use common::tags::strip_hashtags;

use super::IndexStore;

const DEFAULT_RESOURCES_PAGE_SIZE: u32 = 50;
const MAX_RESOURCES_PAGE_SIZE: u32 = 200;
const DEFAULT_AUTHORS_PAGE_SIZE: u32 = 50;
const MAX_AUTHORS_PAGE_SIZE: u32 = 500;
const DEFAULT_TAGS_LIMIT: u32 = 100;
const MAX_TAGS_LIMIT: u32 = 1000;

struct MatchedRow {
    dir_id: String,
    rel_path: String,
    ext: String,
    kind: String,
    time_text: String,
    iso: Option<String>,
    timestamp_ms: Option<i64>,
    author: String,
    theme: String,
    type_text: String,
    seq: Option<i64>,
    created_at_ms: i64,
}

/// `q` matches this concatenation for `/api/resources` and `/api/tags`
/// (spec.md §4.5); `/api/authors` matches `q` against `author` alone, via
/// `AUTHOR_ONLY_Q_COLUMN` below.
const CONCAT_Q_COLUMN: &str =
    "COALESCE(m.author,'') || ' ' || COALESCE(m.theme,'') || ' ' || m.timeText || ' ' || COALESCE(m.typeText,'')";
const AUTHOR_ONLY_Q_COLUMN: &str = "COALESCE(m.author,'')";

fn push_common_filters<'a>(
    qb: &mut QueryBuilder<'a, Sqlite>,
    dir_id: Option<&'a str>,
    type_filter: Option<&'a str>,
    tag: Option<&'a str>,
    author: Option<&'a str>,
    q: Option<&'a str>,
    q_column: &str,
) {
    if let Some(d) = dir_id {
        qb.push(" AND m.dirId = ").push_bind(d);
    }
    if let Some(t) = type_filter {
        if !t.is_empty() {
            qb.push(" AND EXISTS (SELECT 1 FROM media_item_types mt WHERE mt.dirId = m.dirId AND mt.relPath = m.relPath AND mt.type = ")
                .push_bind(t)
                .push(")");
        }
    }
    if let Some(tg) = tag {
        qb.push(" AND EXISTS (SELECT 1 FROM media_item_tags mg WHERE mg.dirId = m.dirId AND mg.relPath = m.relPath AND mg.tag = ")
            .push_bind(tg)
            .push(")");
    }
    if let Some(a) = author {
        qb.push(" AND COALESCE(m.author, '') = ").push_bind(a);
    }
    if let Some(query) = q {
        let escaped = query.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        let pattern = format!("%{}%", escaped.to_lowercase());
        qb.push(format!(" AND LOWER({q_column}) LIKE "))
            .push_bind(pattern)
            .push(" ESCAPE '\\'");
    }
}

async fn fetch_matching(
    store: &IndexStore,
    dir_id: Option<&str>,
    type_filter: Option<&str>,
    tag: Option<&str>,
    author: Option<&str>,
    q: Option<&str>,
    q_column: &str,
) -> Result<Vec<MatchedRow>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT m.dirId, m.relPath, m.ext, m.kind, m.timeText, m.iso, m.timestampMs, \
         m.author, m.theme, m.typeText, m.seq, m.createdAtMs FROM media_items m WHERE 1=1",
    );
    push_common_filters(&mut qb, dir_id, type_filter, tag, author, q, q_column);

    let rows = qb.build().fetch_all(store.pool()).await?;
    Ok(rows
        .iter()
        .map(|r| MatchedRow {
            dir_id: r.get("dirId"),
            rel_path: r.get("relPath"),
            ext: r.get("ext"),
            kind: r.get("kind"),
            time_text: r.get("timeText"),
            iso: r.try_get("iso").ok(),
            timestamp_ms: r.try_get("timestampMs").ok(),
            author: r.get("author"),
            theme: r.get("theme"),
            type_text: r.get("typeText"),
            seq: r.try_get("seq").ok(),
            created_at_ms: r.get("createdAtMs"),
        })
        .collect())
}

async fn fetch_tags_for(
    store: &IndexStore,
    keys: &[(String, String)],
) -> Result<HashMap<(String, String), Vec<String>>> {
    let mut out: HashMap<(String, String), Vec<String>> = HashMap::new();
    if keys.is_empty() {
        return Ok(out);
    }

    let rows = sqlx::query("SELECT dirId, relPath, tag FROM media_item_tags;")
        .fetch_all(store.pool())
        .await?;

    let wanted: BTreeSet<(String, String)> = keys.iter().cloned().collect();
    for r in rows {
        let dir_id: String = r.get("dirId");
        let rel_path: String = r.get("relPath");
        if !wanted.contains(&(dir_id.clone(), rel_path.clone())) {
            continue;
        }
        let tag: String = r.get("tag");
        out.entry((dir_id, rel_path)).or_default().push(tag);
    }

    Ok(out)
}

fn url_for(dir_id: &str, rel_path: &str) -> String {
    format!(
        "/media/{}/{}",
        urlencoding::encode(dir_id),
        urlencoding::encode(rel_path)
    )
}

fn thumb_url_for(kind: MediaKind, dir_id: &str, rel_path: &str) -> Option<String> {
    match kind {
        MediaKind::Image => Some(format!(
            "/thumb/{}/{}",
            urlencoding::encode(dir_id),
            urlencoding::encode(rel_path)
        )),
        MediaKind::Video => Some(format!(
            "/vthumb/{}/{}",
            urlencoding::encode(dir_id),
            urlencoding::encode(rel_path)
        )),
        MediaKind::File => None,
    }
}

struct GroupAccum {
    time_text: String,
    iso: Option<String>,
    timestamp_ms: Option<i64>,
    author: String,
    theme: String,
    rows: Vec<MatchedRow>,
    max_created_at_ms: i64,
}

/// `queryResources`: group matching rows into `(timeText, author, theme)`
/// equivalence classes, sort and paginate the groups, then expand each
/// emitted group's item list
pub async fn query_resources(
    store: &IndexStore,
    filter: &ResourceFilter,
    dirs: Vec<MediaDirOut>,
) -> Result<ResourcesResp> {
    let page = filter.page.unwrap_or(1).max(1);
    let page_size = filter
        .page_size
        .unwrap_or(DEFAULT_RESOURCES_PAGE_SIZE)
        .clamp(1, MAX_RESOURCES_PAGE_SIZE);

    let rows = fetch_matching(
        store,
        filter.dir_id.as_deref(),
        filter.r#type.as_deref(),
        filter.tag.as_deref(),
        filter.author.as_deref(),
        filter.q.as_deref(),
        CONCAT_Q_COLUMN,
    )
    .await?;

    let total_items = rows.len() as u64;

    let mut groups: HashMap<(String, String, String), GroupAccum> = HashMap::new();
    for row in rows {
        let key = (row.time_text.clone(), row.author.clone(), row.theme.clone());
        let entry = groups.entry(key).or_insert_with(|| GroupAccum {
            time_text: row.time_text.clone(),
            iso: row.iso.clone(),
            timestamp_ms: row.timestamp_ms,
            author: row.author.clone(),
            theme: row.theme.clone(),
            rows: Vec::new(),
            max_created_at_ms: row.created_at_ms,
        });
        entry.max_created_at_ms = entry.max_created_at_ms.max(row.created_at_ms);
        entry.rows.push(row);
    }

    let mut group_list: Vec<GroupAccum> = groups.into_values().collect();

    match filter.sort.unwrap_or_default() {
        SortMode::Publish => group_list.sort_by(|a, b| {
            b.timestamp_ms
                .unwrap_or(0)
                .cmp(&a.timestamp_ms.unwrap_or(0))
                .then_with(|| b.time_text.cmp(&a.time_text))
        }),
        SortMode::Ingest => group_list.sort_by(|a, b| {
            b.max_created_at_ms
                .cmp(&a.max_created_at_ms)
                .then_with(|| b.timestamp_ms.unwrap_or(0).cmp(&a.timestamp_ms.unwrap_or(0)))
                .then_with(|| b.time_text.cmp(&a.time_text))
        }),
    }

    let total = group_list.len() as u64;
    let total_pages = if total == 0 {
        1
    } else {
        ((total as f64) / (page_size as f64)).ceil() as u32
    };
    let page = page.min(total_pages.max(1));

    let start = ((page - 1) as usize) * (page_size as usize);
    let page_groups: Vec<GroupAccum> = group_list.into_iter().skip(start).take(page_size as usize).collect();

    let keys: Vec<(String, String)> = page_groups
        .iter()
        .flat_map(|g| g.rows.iter().map(|r| (r.dir_id.clone(), r.rel_path.clone())))
        .collect();
    let tags_by_item = fetch_tags_for(store, &keys).await?;

    let mut out_groups = Vec::with_capacity(page_groups.len());
    for mut g in page_groups {
        g.rows.sort_by(|a, b| {
            a.seq
                .unwrap_or(1_000_000_000)
                .cmp(&b.seq.unwrap_or(1_000_000_000))
                .then_with(|| a.rel_path.cmp(&b.rel_path))
        });

        let mut types: BTreeSet<String> = BTreeSet::new();
        let mut tags: BTreeSet<String> = BTreeSet::new();
        let mut items = Vec::with_capacity(g.rows.len());

        for row in &g.rows {
            for t in row.type_text.split('+').filter(|s| !s.is_empty()) {
                types.insert(t.to_owned());
            }
            if let Some(item_tags) = tags_by_item.get(&(row.dir_id.clone(), row.rel_path.clone())) {
                tags.extend(item_tags.iter().cloned());
            }

            let kind = MediaKind::from_ext(&row.ext);
            items.push(MediaItemOut {
                filename: row.rel_path.clone(),
                dir_id: row.dir_id.clone(),
                url: url_for(&row.dir_id, &row.rel_path),
                ext: row.ext.clone(),
                kind,
                seq: row.seq,
                thumb_url: thumb_url_for(kind, &row.dir_id, &row.rel_path),
            });
        }

        let group_type = match types.len() {
            0 => "unknown".to_owned(),
            1 => types.iter().next().cloned().unwrap(),
            _ => "mixed".to_owned(),
        };

        out_groups.push(Group {
            id: group_id(&g.time_text, &g.author, &g.theme),
            time_text: g.time_text,
            iso: g.iso,
            timestamp_ms: g.timestamp_ms,
            author: g.author,
            theme_text: strip_hashtags(&g.theme),
            theme: g.theme,
            types: types.into_iter().collect(),
            group_type,
            tags: tags.into_iter().collect(),
            items,
        });
    }

    Ok(ResourcesResp {
        ok: true,
        dirs,
        groups: out_groups,
        pagination: Pagination {
            page,
            page_size,
            total,
            total_pages,
            has_more: page < total_pages,
            total_items,
        },
    })
}

/// `queryAuthors`: grouped by `COALESCE(author,'')`. Implemented Rust-side
/// rather than via a database window function -- this still satisfies the
/// degrade-gracefully requirement without depending on whether the backing
/// engine supports `ROW_NUMBER() OVER (...)`, since the aggregation never
/// uses one to begin with.
pub async fn query_authors(
    store: &IndexStore,
    filter: &AuthorsFilter,
    dirs: Vec<MediaDirOut>,
) -> Result<AuthorsResp> {
    let page = filter.page.unwrap_or(1).max(1);
    let page_size = filter
        .page_size
        .unwrap_or(DEFAULT_AUTHORS_PAGE_SIZE)
        .clamp(1, MAX_AUTHORS_PAGE_SIZE);

    let rows = fetch_matching(
        store,
        filter.dir_id.as_deref(),
        filter.r#type.as_deref(),
        filter.tag.as_deref(),
        None,
        filter.q.as_deref(),
        AUTHOR_ONLY_Q_COLUMN,
    )
    .await?;

    struct AuthorAccum {
        groups: BTreeSet<(String, String)>,
        item_count: u64,
        latest: Option<MatchedRow>,
    }

    let mut by_author: HashMap<String, AuthorAccum> = HashMap::new();
    for row in rows {
        let entry = by_author.entry(row.author.clone()).or_insert_with(|| AuthorAccum {
            groups: BTreeSet::new(),
            item_count: 0,
            latest: None,
        });
        entry.groups.insert((row.time_text.clone(), row.theme.clone()));
        entry.item_count += 1;

        let better = match &entry.latest {
            None => true,
            Some(cur) => {
                (row.timestamp_ms.unwrap_or(0), row.time_text.as_str(), row.rel_path.as_str())
                    > (cur.timestamp_ms.unwrap_or(0), cur.time_text.as_str(), cur.rel_path.as_str())
            }
        };
        if better {
            entry.latest = Some(row);
        }
    }

    let mut entries: Vec<AuthorEntry> = by_author
        .into_iter()
        .map(|(author, acc)| {
            let latest_item = acc.latest.as_ref().map(|row| {
                let kind = MediaKind::from_ext(&row.ext);
                api::media::MediaItemOut {
                    filename: row.rel_path.clone(),
                    dir_id: row.dir_id.clone(),
                    url: url_for(&row.dir_id, &row.rel_path),
                    ext: row.ext.clone(),
                    kind,
                    seq: row.seq,
                    thumb_url: thumb_url_for(kind, &row.dir_id, &row.rel_path),
                }
            });
            AuthorEntry {
                author,
                group_count: acc.groups.len() as u64,
                item_count: acc.item_count,
                latest_timestamp_ms: acc.latest.as_ref().and_then(|r| r.timestamp_ms),
                latest_item,
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        b.group_count
            .cmp(&a.group_count)
            .then_with(|| b.item_count.cmp(&a.item_count))
            .then_with(|| b.latest_timestamp_ms.unwrap_or(0).cmp(&a.latest_timestamp_ms.unwrap_or(0)))
            .then_with(|| a.author.cmp(&b.author))
    });

    let total = entries.len() as u64;
    let total_pages = if total == 0 {
        1
    } else {
        ((total as f64) / (page_size as f64)).ceil() as u32
    };
    let page = page.min(total_pages.max(1));
    let start = ((page - 1) as usize) * (page_size as usize);
    let page_entries: Vec<AuthorEntry> = entries.into_iter().skip(start).take(page_size as usize).collect();

    Ok(AuthorsResp {
        ok: true,
        dirs,
        authors: page_entries,
        pagination: Pagination {
            page,
            page_size,
            total,
            total_pages,
            has_more: page < total_pages,
            total_items: total,
        },
    })
}

/// `queryTags`: grouped by normalized tag
pub async fn query_tags(store: &IndexStore, filter: &TagsFilter) -> Result<TagsResp> {
    let limit = filter.limit.unwrap_or(DEFAULT_TAGS_LIMIT).clamp(1, MAX_TAGS_LIMIT);

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT t.tag, m.dirId, m.relPath, m.timeText, m.theme, m.timestampMs \
         FROM media_item_tags t JOIN media_items m ON m.dirId = t.dirId AND m.relPath = t.relPath \
         WHERE 1=1",
    );
    if let Some(d) = filter.dir_id.as_deref() {
        qb.push(" AND m.dirId = ").push_bind(d);
    }
    if let Some(q) = filter.q.as_deref() {
        let pattern = format!("%{}%", q.to_lowercase());
        qb.push(" AND LOWER(t.tag) LIKE ").push_bind(pattern);
    }

    let rows = qb.build().fetch_all(store.pool()).await?;

    struct TagAccum {
        groups: BTreeSet<(String, String)>,
        item_count: u64,
        latest_timestamp_ms: Option<i64>,
    }

    let mut by_tag: HashMap<String, TagAccum> = HashMap::new();
    for r in rows {
        let tag: String = r.get("tag");
        let time_text: String = r.get("timeText");
        let theme: String = r.get("theme");
        let timestamp_ms: Option<i64> = r.try_get("timestampMs").ok();

        let entry = by_tag.entry(tag).or_insert_with(|| TagAccum {
            groups: BTreeSet::new(),
            item_count: 0,
            latest_timestamp_ms: None,
        });
        entry.groups.insert((time_text, theme));
        entry.item_count += 1;
        entry.latest_timestamp_ms = match (entry.latest_timestamp_ms, timestamp_ms) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (None, v) => v,
            (v, None) => v,
        };
    }

    let mut tags: Vec<TagEntry> = by_tag
        .into_iter()
        .map(|(tag, acc)| TagEntry {
            tag,
            group_count: acc.groups.len() as u64,
            item_count: acc.item_count,
            latest_timestamp_ms: acc.latest_timestamp_ms,
        })
        .collect();

    tags.sort_by(|a, b| {
        b.group_count
            .cmp(&a.group_count)
            .then_with(|| b.item_count.cmp(&a.item_count))
            .then_with(|| a.tag.cmp(&b.tag))
    });
    tags.truncate(limit as usize);

    Ok(TagsResp { ok: true, tags })
}
