use scraper::ElementRef;
use tracing::warn;

use crate::error::Result;
use crate::extract::{
    absolute_url, element_text, id_after, non_empty, title_prefix, SelectorChain,
};
use crate::model::{PlayerRecord, Stats, TeamRecord};
use crate::normalize::{slugify, title_case};
use crate::vlr_scraper::BASE_URL;

struct CardSelectors {
    link: SelectorChain,
    name: SelectorChain,
    role: SelectorChain,
    country: SelectorChain,
    flag: SelectorChain,
    image: SelectorChain,
}

impl CardSelectors {
    fn new() -> Result<Self> {
        Ok(Self {
            link: SelectorChain::new(&["a[href]"])?,
            name: SelectorChain::new(&[
                ".team-roster-item-name-alias",
                ".player-name",
                ".mod-player",
                ".text-of",
                ".team-roster-item-name",
            ])?,
            role: SelectorChain::new(&[
                ".team-roster-item-name-role",
                ".player-role",
                ".mod-role",
                ".team-roster-item-role",
            ])?,
            country: SelectorChain::new(&[
                ".player-country",
                ".mod-flag",
                ".team-roster-item-country",
            ])?,
            flag: SelectorChain::new(&["i.flag"])?,
            image: SelectorChain::new(&[
                ".team-roster-item-img img",
                ".player-thumbnail img",
            ])?,
        })
    }
}

/// Parse a team page: header metadata, summary stats and the embedded roster.
/// Pages whose roster is not laid out as roster items go through
/// [`parse_team_players`] on the same document.
pub(crate) fn parse_team(team_id: &str, root: &ElementRef) -> Result<TeamRecord> {
    let name_chain = SelectorChain::new(&[
        ".team-header h1.wf-title",
        ".team-header-name",
        "h1.wf-title",
    ])?;
    let name = name_chain
        .leading_text(root)
        .or_else(|| title_prefix(root, &[':', '|']))
        .unwrap_or_else(|| title_case(team_id));

    let region = SelectorChain::new(&[".team-header-country"])?.text(root);
    let logo_url = SelectorChain::new(&[".team-header-logo img"])?
        .attr(root, "src")
        .map(|src| absolute_url(BASE_URL, &src));

    let mut stats = parse_summary_stats(root)?;
    if let Some(tag) = SelectorChain::new(&["h2.wf-title.team-header-tag"])?.text(root) {
        stats.insert("tag".to_string(), tag.into());
    }

    let cards = SelectorChain::new(&[".team-roster-item", ".player-card"])?.all(root);
    let mut roster = parse_cards(team_id, &cards)?;
    if roster.is_empty() {
        roster = parse_team_players(team_id, root)?;
    }

    Ok(TeamRecord {
        id: team_id.to_string(),
        name,
        region,
        logo_url,
        stats,
        roster,
    })
}

/// `label -> value` pairs of the team summary panel, labels snake-cased.
fn parse_summary_stats(root: &ElementRef) -> Result<Stats> {
    let items = SelectorChain::new(&[".team-summary-container-stats .stat-item"])?;
    let label = SelectorChain::new(&[".label"])?;
    let value = SelectorChain::new(&[".value"])?;

    Ok(items
        .all(root)
        .iter()
        .filter_map(|item| {
            let label = label.text(item)?;
            let value = value.text(item)?;
            Some((
                label.to_lowercase().replace(' ', "_"),
                serde_json::Value::from(value),
            ))
        })
        .collect())
}

/// Parse the roster of a team page on its own, searching the known roster
/// containers in turn before falling back to roster rows anywhere on the page.
pub(crate) fn parse_team_players(team_id: &str, root: &ElementRef) -> Result<Vec<PlayerRecord>> {
    let labels = SelectorChain::new(&[".wf-card .wf-module-label"])?;
    let containers = SelectorChain::new(&[".wf-card.mod-roster", ".team-roster-container"])?;
    let container_cards = SelectorChain::new(&[".wf-module-item", ".team-roster-item"])?;
    let page_cards = SelectorChain::new(&[".team-roster-item"])?;

    let container = labels
        .all(root)
        .into_iter()
        .find(|l| element_text(l).to_lowercase().contains("players"))
        .and_then(|l| l.parent().and_then(ElementRef::wrap))
        .or_else(|| containers.first(root));

    let mut cards = container
        .map(|c| container_cards.all(&c))
        .unwrap_or_default();
    if cards.is_empty() {
        cards = page_cards.all(root);
    }
    parse_cards(team_id, &cards)
}

fn parse_cards(team_id: &str, cards: &[ElementRef]) -> Result<Vec<PlayerRecord>> {
    let selectors = CardSelectors::new()?;
    Ok(cards
        .iter()
        .filter_map(|card| {
            let player = parse_card(&selectors, team_id, card);
            if player.is_none() {
                warn!(team = team_id, "skipping roster entry without name");
            }
            player
        })
        .collect())
}

fn parse_card(selectors: &CardSelectors, team_id: &str, card: &ElementRef) -> Option<PlayerRecord> {
    let href = selectors
        .link
        .attr(card, "href")
        .or_else(|| card.value().attr("href").map(str::to_string));
    let name = selectors.name.leading_text(card).and_then(non_empty)?;
    let id = href
        .as_deref()
        .and_then(|h| id_after(h, "/player/"))
        .unwrap_or_else(|| slugify(&name));

    let country = selectors.country.text(card).or_else(|| {
        selectors.flag.attr(card, "title").or_else(|| {
            selectors.flag.first(card).and_then(|flag| {
                flag.value()
                    .classes()
                    .find_map(|c| c.strip_prefix("mod-"))
                    .map(str::to_uppercase)
            })
        })
    });

    let mut player = PlayerRecord::new(id, name);
    player.team_id = Some(team_id.to_string());
    player.role = selectors.role.text(card);
    player.country = country;
    player.image_url = selectors
        .image
        .attr(card, "src")
        .map(|src| absolute_url(BASE_URL, &src));
    Some(player)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::with_document;

    const TEAM_PAGE: &str = r#"
        <html><head><title>Sentinels: Valorant Team Profile | VLR.gg</title></head><body>
          <div class="team-header">
            <div class="team-header-logo"><img src="//owcdn.net/img/sen.png"></div>
            <h1 class="wf-title">Sentinels</h1>
            <h2 class="wf-title team-header-tag">SEN</h2>
            <div class="team-header-country"><i class="flag mod-us"></i> United States</div>
          </div>
          <div class="team-summary-container-stats">
            <div class="stat-item"><div class="label">Total Winnings</div><div class="value">$1,200,000</div></div>
          </div>
          <div class="wf-card">
            <div class="wf-module-label">players</div>
            <div class="team-roster-item">
              <a href="/player/9/tenz">
                <div class="team-roster-item-img"><img src="/img/base/ph/sil.png"></div>
                <div class="team-roster-item-name">
                  <div class="team-roster-item-name-alias"><i class="flag mod-ca"></i> TenZ</div>
                  <div class="team-roster-item-name-real">Tyson Ngo</div>
                </div>
              </a>
            </div>
            <div class="team-roster-item">
              <a href="/player/4004/zekken">
                <div class="team-roster-item-name">
                  <div class="team-roster-item-name-alias"><i class="flag mod-us"></i> zekken</div>
                  <div class="team-roster-item-name-role">Sub</div>
                </div>
              </a>
            </div>
            <div class="team-roster-item"><a href="/player/0/ghost"></a></div>
          </div>
        </body></html>"#;

    #[test]
    fn test_parse_team() {
        let team = with_document(TEAM_PAGE, |root| parse_team("2", root)).unwrap();
        assert_eq!(team.id, "2");
        assert_eq!(team.name, "Sentinels");
        assert_eq!(team.region.as_deref(), Some("United States"));
        assert_eq!(team.logo_url.as_deref(), Some("https://owcdn.net/img/sen.png"));
        assert_eq!(team.stats["total_winnings"], "$1,200,000");
        assert_eq!(team.stats["tag"], "SEN");

        assert_eq!(team.roster.len(), 2);
        let tenz = &team.roster[0];
        assert_eq!(tenz.id, "9");
        assert_eq!(tenz.name, "TenZ");
        assert_eq!(tenz.team_id.as_deref(), Some("2"));
        assert_eq!(tenz.country.as_deref(), Some("CA"));
        assert_eq!(
            tenz.image_url.as_deref(),
            Some("https://www.vlr.gg/img/base/ph/sil.png")
        );
        assert_eq!(team.roster[1].role.as_deref(), Some("Sub"));
    }

    #[test]
    fn test_parse_team_without_header_falls_back_to_title() {
        let page = r#"<html><head><title>Sentinels: Valorant Team Profile | VLR.gg</title></head>
                      <body><p>empty</p></body></html>"#;
        let team = with_document(page, |root| parse_team("2", root)).unwrap();
        assert_eq!(team.name, "Sentinels");
        assert!(team.roster.is_empty());

        let team = with_document("<html><body></body></html>", |root| {
            parse_team("team-liquid", root)
        })
        .unwrap();
        assert_eq!(team.name, "Team Liquid");
    }

    #[test]
    fn test_parse_team_players_from_labelled_card() {
        let players = with_document(TEAM_PAGE, |root| parse_team_players("2", root)).unwrap();
        let names: Vec<_> = players.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["TenZ", "zekken"]);
    }

    const LEGACY_ROSTER_PAGE: &str = r#"<html><body><div class="wf-card mod-roster">
              <div class="wf-module-item"><a href="/player/601/demon1"><span class="text-of">Demon1</span></a><span class="mod-role">Duelist</span></div>
              <div class="wf-module-item"><a href="/team/2/sentinels"><span class="text-of">Boaster</span></a></div>
            </div></body></html>"#;

    #[test]
    fn test_parse_team_players_legacy_cards() {
        let players =
            with_document(LEGACY_ROSTER_PAGE, |root| parse_team_players("eg", root)).unwrap();
        assert_eq!(players.len(), 2);
        assert_eq!(players[0].id, "601");
        assert_eq!(players[0].role.as_deref(), Some("Duelist"));
        // No player link: id derived from the name.
        assert_eq!(players[1].id, "boaster");
    }

    #[test]
    fn test_parse_team_takes_roster_from_legacy_cards() {
        let team = with_document(LEGACY_ROSTER_PAGE, |root| parse_team("eg", root)).unwrap();
        let ids: Vec<_> = team.roster.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["601", "boaster"]);
        assert!(team.roster.iter().all(|p| p.team_id.as_deref() == Some("eg")));
    }
}
